use std::path::Path;
use std::sync::Arc;

use kindling::host::{IdleScheduler, MainLoop, PluginDescriptor, TypeHandle, TypeRegistry};
use kindling::{EmbeddedRuntime, LoaderConfig, LuaPluginLoader};
use tempfile::TempDir;

const SAMPLE_PLUGIN: &str = r#"
local Greeter = host.types.Greeter

SampleGreeter = host.class("SampleGreeter", Greeter)

function SampleGreeter:greet()
    return "hello"
end
"#;

/// A loader on its own runtime, with plugins under a temporary directory.
struct Fixture {
    dir: TempDir,
    runtime: Arc<EmbeddedRuntime>,
    host: Arc<TypeRegistry>,
    greeter: TypeHandle,
    main_loop: Arc<MainLoop>,
    loader: LuaPluginLoader,
}

fn test_config(dir: &Path) -> LoaderConfig {
    let mut config = LoaderConfig::default();
    config.runtime.program_name = Some("kindling-tests".to_string());
    config.runtime.support_dir = dir.join("support");
    config.localization.locale_dir = dir.join("locale");
    config.localization.language = Some("en".to_string());
    config
}

fn fixture_with(configure: impl FnOnce(&mut LoaderConfig), runtime: Arc<EmbeddedRuntime>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let host = Arc::new(TypeRegistry::new());
    let greeter = host.register_interface("Greeter", &["greet"]).unwrap();
    let main_loop = Arc::new(MainLoop::new());
    let scheduler: Arc<dyn IdleScheduler> = main_loop.clone();
    let loader = LuaPluginLoader::with_runtime(config, Arc::clone(&runtime), Arc::clone(&host), scheduler);

    Fixture {
        dir,
        runtime,
        host,
        greeter,
        main_loop,
        loader,
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {}, Arc::new(EmbeddedRuntime::new()))
}

fn ready_fixture() -> Fixture {
    let fixture = fixture();
    fixture.loader.initialize().unwrap();
    fixture
}

impl Fixture {
    fn plugin(&self, name: &str, source: &str) -> PluginDescriptor {
        let plugin_dir = self.dir.path().join("plugins").join(name);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(format!("{name}.lua")), source).unwrap();
        PluginDescriptor::new(name, plugin_dir, name)
    }

    fn eval_bool(&self, code: &str) -> bool {
        let token = self.runtime.acquire();
        let lua = token.lua().unwrap();
        let value: bool = lua.load(code).eval().unwrap();
        value
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use kindling::loader::hooks::{ALL_PLUGINS_UNLOADED, EXIT};
    use kindling::{InitError, Phase};
    use mlua::Lua;

    #[test]
    fn test_end_to_end_sample_plugin() {
        let fx = ready_fixture();
        assert_eq!(fx.loader.phase(), Phase::Ready);
        assert!(fx.loader.owns_runtime());

        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        assert!(fx.loader.provides_extension(&sample, fx.greeter));

        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), serde_json::json!("hello"));
        drop(extension);

        fx.loader.unload(&sample);
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 1);

        fx.loader.finalize();
        assert_eq!(fx.loader.phase(), Phase::Finalized);
        assert_eq!(fx.loader.hooks().invocations(EXIT), 1);

        fx.loader.unload(&sample);
        fx.loader.finalize();
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 1);
        assert_eq!(fx.loader.hooks().invocations(EXIT), 1);
        assert!(!fx.runtime.is_running());
    }

    #[test]
    fn test_initialize_twice_is_a_no_op() {
        let fx = ready_fixture();
        fx.loader.initialize().unwrap();
        assert_eq!(fx.loader.phase(), Phase::Ready);
    }

    #[test]
    fn test_owned_runtime_is_sandboxed() {
        let fx = ready_fixture();
        assert!(fx.eval_bool("return os.exit == nil and io.popen == nil"));
        assert!(fx.eval_bool("return arg[0] == 'kindling-tests'"));
    }

    #[test]
    fn test_attach_to_running_runtime() {
        let runtime = Arc::new(EmbeddedRuntime::new());
        assert!(runtime.install(Lua::new()));
        let fx = fixture_with(|_| {}, runtime);

        fx.loader.initialize().unwrap();
        assert!(!fx.loader.owns_runtime());
        // Attached loaders leave process control alone.
        assert!(fx.eval_bool("return os.exit ~= nil"));

        fx.loader.finalize();
        assert!(fx.runtime.is_running());
        assert!(fx.eval_bool("return host ~= nil"));
    }

    #[test]
    fn test_version_mismatch_leaves_runtime_untouched() {
        let runtime = Arc::new(EmbeddedRuntime::new());
        let lua = Lua::new();
        lua.globals().set("_VERSION", "Lua 5.1").unwrap();
        assert!(runtime.install(lua));
        let fx = fixture_with(|_| {}, runtime);

        match fx.loader.initialize() {
            Err(InitError::VersionMismatch { found, .. }) => assert_eq!(found, "Lua 5.1"),
            other => panic!("expected a version mismatch, got {other:?}"),
        }
        assert_eq!(fx.loader.phase(), Phase::Failed);
        assert!(!fx.loader.hooks().is_installed());
        assert_eq!(fx.loader.loaded_count(), 0);
        assert!(fx.eval_bool("return host == nil and arg == nil"));

        fx.loader.finalize();
        assert!(fx.runtime.is_running());
        assert_eq!(fx.loader.hooks().invocations(EXIT), 0);
    }

    #[test]
    fn test_failed_loader_cannot_be_reinitialized() {
        let runtime = Arc::new(EmbeddedRuntime::new());
        let lua = Lua::new();
        lua.globals().set("_VERSION", "Lua 5.3").unwrap();
        runtime.install(lua);
        let fx = fixture_with(|_| {}, runtime);

        assert!(fx.loader.initialize().is_err());
        assert!(matches!(
            fx.loader.initialize(),
            Err(InitError::InvalidPhase(Phase::Failed))
        ));
    }

    #[test]
    fn test_disabled_localization_fails_bootstrap() {
        let fx = fixture_with(
            |config| config.localization.enabled = false,
            Arc::new(EmbeddedRuntime::new()),
        );
        assert!(matches!(
            fx.loader.initialize(),
            Err(InitError::MissingLocalization)
        ));
        assert_eq!(fx.loader.phase(), Phase::Failed);
        assert!(!fx.loader.hooks().is_installed());

        // The loader started the runtime, so it still shuts it down.
        fx.loader.finalize();
        assert!(!fx.runtime.is_running());
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let fx = fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        assert!(matches!(
            fx.loader.load(&sample),
            Err(kindling::LoadError::NotInitialized)
        ));
        assert!(matches!(
            fx.loader.create_extension(&sample, fx.greeter, &[]),
            Err(kindling::CreateError::NotInitialized)
        ));
        fx.loader.finalize();
        assert_eq!(fx.loader.phase(), Phase::Finalized);
    }

    #[test]
    fn test_drop_finalizes() {
        let runtime = Arc::new(EmbeddedRuntime::new());
        {
            let fx = fixture_with(|_| {}, Arc::clone(&runtime));
            fx.loader.initialize().unwrap();
            assert!(runtime.is_running());
        }
        assert!(!runtime.is_running());
    }

    #[test]
    fn test_translations_reach_plugins() {
        let fx = fixture();
        let catalog_dir = fx.dir.path().join("locale").join("en");
        std::fs::create_dir_all(&catalog_dir).unwrap();
        std::fs::write(catalog_dir.join("kindling.yaml"), "Hello: Howdy\n").unwrap();
        fx.loader.initialize().unwrap();
        assert!(fx.eval_bool(r#"return _("Hello") == "Howdy""#));
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::sync::Mutex;
    use kindling::loader::hooks::ALL_PLUGINS_UNLOADED;
    use kindling::LoadError;

    #[test]
    fn test_load_twice_keeps_one_entry() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        fx.loader.load(&sample).unwrap();
        assert!(fx.loader.is_loaded(&sample));
        assert_eq!(fx.loader.loaded_count(), 1);
    }

    #[test]
    fn test_unload_unknown_plugin_is_a_no_op() {
        let fx = ready_fixture();
        let ghost = PluginDescriptor::new("ghost", fx.dir.path(), "ghost");
        fx.loader.unload(&ghost);
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 0);
    }

    #[test]
    fn test_hook_fires_only_when_registry_empties() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        let other = fx.plugin("other", "answer = 42\n");
        fx.loader.load(&sample).unwrap();
        fx.loader.load(&other).unwrap();

        fx.loader.unload(&sample);
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 0);
        fx.loader.unload(&other);
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 1);

        // Loading again must not fire it by itself.
        fx.loader.load(&sample).unwrap();
        assert_eq!(fx.loader.hooks().invocations(ALL_PLUGINS_UNLOADED), 1);
    }

    #[test]
    fn test_import_failure_is_scoped_to_plugin() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        let broken = fx.plugin("broken", "this is not lua\n");
        fx.loader.load(&sample).unwrap();

        let err = fx.loader.load(&broken).unwrap_err();
        assert!(matches!(err, LoadError::Import { ref plugin, .. } if plugin == "broken"));
        assert!(!fx.loader.is_loaded(&broken));
        assert!(fx.loader.is_loaded(&sample));
        assert!(fx.loader.provides_extension(&sample, fx.greeter));
    }

    #[test]
    fn test_plugins_may_reuse_class_names() {
        let fx = ready_fixture();
        let source = r#"
            Impl = host.class("Impl", host.types.Greeter)
            function Impl:greet() return "hello" end
        "#;
        let alpha = fx.plugin("alpha", source);
        let beta = fx.plugin("beta", source);
        fx.loader.load(&alpha).unwrap();
        fx.loader.load(&beta).unwrap();

        assert!(fx.host.lookup("alpha+Impl").is_some());
        assert!(fx.host.lookup("beta+Impl").is_some());
        for plugin in [&alpha, &beta] {
            let extension = fx.loader.create_extension(plugin, fx.greeter, &[]).unwrap();
            assert_eq!(extension.call("greet", &[]).unwrap(), "hello");
        }
    }

    #[test]
    fn test_retry_after_failed_import() {
        let fx = ready_fixture();
        let flaky = fx.plugin(
            "flaky",
            r#"
            Impl = host.class("Impl", host.types.Greeter)
            error("not yet")
        "#,
        );
        assert!(fx.loader.load(&flaky).is_err());

        let flaky = fx.plugin(
            "flaky",
            r#"
            Impl = host.class("Impl", host.types.Greeter)
            function Impl:greet() return "ready" end
        "#,
        );
        fx.loader.load(&flaky).unwrap();
        let extension = fx.loader.create_extension(&flaky, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), "ready");
    }

    #[test]
    fn test_fresh_loader_on_shared_host() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        fx.loader.finalize();

        let scheduler: Arc<dyn IdleScheduler> = Arc::new(MainLoop::new());
        let loader = LuaPluginLoader::with_runtime(
            test_config(fx.dir.path()),
            Arc::new(EmbeddedRuntime::new()),
            Arc::clone(&fx.host),
            scheduler,
        );
        loader.initialize().unwrap();
        loader.load(&sample).unwrap();
        let extension = loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), "hello");
    }

    #[test]
    fn test_unload_hook_runs_before_other_threads_resume() {
        let fx = ready_fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let token = fx.runtime.acquire();
            let lua = token.lua().unwrap();
            let sink = Arc::clone(&events);
            let record = lua
                .create_function(move |_, event: String| {
                    sink.lock().unwrap().push(event);
                    Ok(())
                })
                .unwrap();
            lua.globals().set("record", record).unwrap();
        }
        let listener = fx.plugin(
            "ordered",
            r#"host.connect("all_plugins_unloaded", function() record("hook") end)"#,
        );
        fx.loader.load(&listener).unwrap();

        let loader = &fx.loader;
        let runtime = &fx.runtime;
        let watched = Arc::clone(&events);
        std::thread::scope(|scope| {
            let watcher = scope.spawn(move || {
                while loader.loaded_count() > 0 {
                    std::thread::yield_now();
                }
                let _token = runtime.acquire();
                watched.lock().unwrap().push("other thread".to_string());
            });
            loader.unload(&listener);
            watcher.join().unwrap();
        });

        let events = events.lock().unwrap();
        assert_eq!(*events, vec!["hook".to_string(), "other thread".to_string()]);
    }

    #[test]
    fn test_dotted_module_names() {
        let fx = ready_fixture();
        let plugin_dir = fx.dir.path().join("plugins").join("nested");
        std::fs::create_dir_all(plugin_dir.join("nested")).unwrap();
        std::fs::write(plugin_dir.join("nested").join("impl.lua"), SAMPLE_PLUGIN).unwrap();
        let nested = PluginDescriptor::new("nested", &plugin_dir, "nested.impl");

        fx.loader.load(&nested).unwrap();
        let extension = fx.loader.create_extension(&nested, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), "hello");
    }

    #[test]
    fn test_listeners_hear_loader_events() {
        let fx = ready_fixture();
        let listener = fx.plugin(
            "listener",
            r#"
            host.connect("all_plugins_unloaded", function()
                _G.unloaded_seen = (_G.unloaded_seen or 0) + 1
            end)
            host.connect("all_plugins_unloaded", function() error("listener failure") end)
        "#,
        );
        fx.loader.load(&listener).unwrap();
        fx.loader.unload(&listener);
        assert!(fx.eval_bool("return unloaded_seen == 1"));
    }
}

#[cfg(test)]
mod extension_tests {
    use super::*;
    use kindling::host::Parameter;
    use kindling::{CreateError, HostError};

    #[test]
    fn test_no_match_is_not_an_error() {
        let fx = ready_fixture();
        let other = fx.host.register_interface("Other", &["other"]).unwrap();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();

        assert!(!fx.loader.provides_extension(&sample, other));
        assert_eq!(fx.loader.extension_type_name(&sample, other), None);
        let err = fx.loader.create_extension(&sample, other, &[]).unwrap_err();
        assert!(err.is_no_match());
        assert_eq!(
            fx.loader.extension_type_name(&sample, fx.greeter).as_deref(),
            Some("SampleGreeter")
        );
    }

    #[test]
    fn test_two_creations_are_independent() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();

        let first = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        let second = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.object().id(), second.object().id());
        assert_eq!(first.strong_count(), 1);
        assert_eq!(second.strong_count(), 1);
        assert_eq!(first.interface(), fx.greeter);

        let first_info = first.plugin_info().unwrap().unwrap();
        let second_info = second.plugin_info().unwrap().unwrap();
        assert_eq!(first_info, sample);
        assert_eq!(first_info, second_info);
        assert_eq!(first.plugin(), &sample);
    }

    #[test]
    fn test_plugin_info_visible_to_lua() {
        let fx = ready_fixture();
        let sample = fx.plugin(
            "introspect",
            r#"
            Introspecting = host.class("Introspecting", host.types.Greeter)
            function Introspecting:greet()
                return self.plugin_info.id
            end
        "#,
        );
        fx.loader.load(&sample).unwrap();
        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), "introspect");
    }

    #[test]
    fn test_constructor_parameters() {
        let fx = ready_fixture();
        let plugin = fx.plugin(
            "named",
            r#"
            Named = host.class("Named", host.types.Greeter)
            function Named:init(props)
                self.name = props.name or "nobody"
            end
            function Named:greet(punctuation)
                return "hello " .. self.name .. (punctuation or "")
            end
        "#,
        );
        fx.loader.load(&plugin).unwrap();
        let extension = fx
            .loader
            .create_extension(&plugin, fx.greeter, &[Parameter::new("name", "world")])
            .unwrap();
        let reply = extension.call("greet", &[serde_json::json!("!")]).unwrap();
        assert_eq!(reply, "hello world!");
    }

    #[test]
    fn test_undeclared_method_is_rejected() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert!(matches!(
            extension.call("shout", &[]),
            Err(HostError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let fx = ready_fixture();
        let plugin = fx.plugin(
            "impostor",
            r#"
            Impostor = host.class("Impostor")
            -- Lua claims Greeter ancestry the host never agreed to.
            Impostor.__parents = { host.types.Greeter }
        "#,
        );
        fx.loader.load(&plugin).unwrap();
        let err = fx.loader.create_extension(&plugin, fx.greeter, &[]).unwrap_err();
        assert!(matches!(err, CreateError::TypeMismatch { ref class, .. } if class == "Impostor"));
    }

    #[test]
    fn test_construction_failure() {
        let fx = ready_fixture();
        let plugin = fx.plugin(
            "failing",
            r#"
            Failing = host.class("Failing", host.types.Greeter)
            function Failing:init() error("cannot build") end
        "#,
        );
        fx.loader.load(&plugin).unwrap();
        let err = fx.loader.create_extension(&plugin, fx.greeter, &[]).unwrap_err();
        assert!(matches!(err, CreateError::ConstructionFailed { .. }));
    }

    #[test]
    fn test_metadata_attach_failure_discards_object() {
        let fx = ready_fixture();
        let plugin = fx.plugin(
            "sealed",
            r#"
            Sealed = host.class("Sealed", host.types.Greeter)
            Sealed.__newindex = function() error("sealed") end
        "#,
        );
        fx.loader.load(&plugin).unwrap();
        let err = fx.loader.create_extension(&plugin, fx.greeter, &[]).unwrap_err();
        assert!(matches!(err, CreateError::MetadataAttachFailed { .. }));
        assert!(!err.is_no_match());
    }

    #[test]
    fn test_not_loaded_plugin() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        assert!(matches!(
            fx.loader.create_extension(&sample, fx.greeter, &[]),
            Err(CreateError::NotLoaded(id)) if id == "sample"
        ));
        assert!(!fx.loader.provides_extension(&sample, fx.greeter));
    }

    #[test]
    fn test_extension_outliving_runtime() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();

        fx.loader.finalize();
        assert!(matches!(
            extension.call("greet", &[]),
            Err(HostError::RuntimeUnavailable)
        ));
        drop(extension);
    }

    #[test]
    fn test_extensions_used_from_other_threads() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mode = fx.runtime.acquire().mode();
                        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
                        let reply = extension.call("greet", &[]).unwrap();
                        (mode, reply)
                    })
                })
                .collect();
            for handle in handles {
                let (mode, reply) = handle.join().unwrap();
                assert_eq!(mode, kindling::LockMode::Shared);
                assert_eq!(reply, "hello");
            }
        });
    }

    #[test]
    fn test_backend_trait_object() {
        use kindling::PluginLoader;

        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        let backend: &dyn PluginLoader = &fx.loader;
        backend.load(&sample).unwrap();
        assert!(backend.is_loaded(&sample));
        assert!(backend.provides_extension(&sample, fx.greeter));
        let extension = backend.create_extension(&sample, fx.greeter, &[]).unwrap();
        assert_eq!(extension.call("greet", &[]).unwrap(), "hello");
        backend.unload(&sample);
        assert!(!backend.is_loaded(&sample));
    }
}

#[cfg(test)]
mod gc_tests {
    use super::*;
    use kindling::loader::CollectionReport;

    #[test]
    fn test_quiescent_collection_takes_one_pass() {
        let fx = ready_fixture();
        fx.loader.collect_now();
        assert_eq!(
            fx.loader.collect_now(),
            CollectionReport {
                passes: 1,
                freed_bytes: 0
            }
        );
    }

    #[test]
    fn test_deferred_collection_coalesces() {
        let fx = ready_fixture();
        for _ in 0..10 {
            fx.loader.garbage_collect();
        }
        assert_eq!(fx.main_loop.pending(), 1);
        assert!(fx.loader.gc().has_pending());

        assert_eq!(fx.main_loop.iteration(), 1);
        assert!(!fx.loader.gc().has_pending());

        fx.loader.garbage_collect();
        fx.loader.garbage_collect();
        assert_eq!(fx.main_loop.pending(), 1);
    }

    #[test]
    fn test_finalize_cancels_deferred_collection() {
        let fx = ready_fixture();
        fx.loader.garbage_collect();
        assert_eq!(fx.main_loop.pending(), 1);

        fx.loader.finalize();
        assert_eq!(fx.main_loop.pending(), 0);
        assert_eq!(fx.main_loop.iteration(), 0);
    }

    #[test]
    fn test_dropped_extension_releases_lua_instance() {
        let fx = ready_fixture();
        let sample = fx.plugin("sample", SAMPLE_PLUGIN);
        fx.loader.load(&sample).unwrap();
        fx.loader.collect_now();

        let extension = fx.loader.create_extension(&sample, fx.greeter, &[]).unwrap();
        let weak = extension.object().downgrade();
        drop(extension);
        assert!(weak.upgrade().is_none());

        let report = fx.loader.collect_now();
        assert!(report.freed_bytes > 0);
    }
}

#[cfg(test)]
mod config_tests {
    use kindling::config::LoaderConfig;
    use tempfile::tempdir;

    #[test]
    fn test_config_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("loader.yaml");
        let yaml = r#"
runtime:
  program_name: demo
  support_dir: /opt/demo/lua
gc:
  max_passes: 3
"#;
        std::fs::write(&config_path, yaml).unwrap();

        let config = LoaderConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.runtime.program_name.as_deref(), Some("demo"));
        assert_eq!(config.runtime.support_dir, std::path::PathBuf::from("/opt/demo/lua"));
        assert_eq!(config.gc.max_passes, 3);
        assert!(config.localization.enabled);
    }

    #[test]
    fn test_config_memory_efficiency() {
        const MAX_CONFIG_SIZE: usize = 1024;
        let size = std::mem::size_of::<LoaderConfig>();
        assert!(
            size < MAX_CONFIG_SIZE,
            "LoaderConfig struct is too large: {size} bytes"
        );
    }
}
