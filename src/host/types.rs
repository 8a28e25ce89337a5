//! Host type registry: the native interfaces and object types extensions
//! are checked against.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HostError;
use crate::host::object::{HostObject, ObjectBacking};

/// Opaque identifier of a host type or interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeHandle(u32);

impl TypeHandle {
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Interface,
    Object,
}

/// A named construction argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: serde_json::Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Builds the backing state of a new object of a registered type.
pub trait Constructor: Send + Sync {
    fn construct(
        &self,
        ty: TypeHandle,
        params: &[Parameter],
    ) -> Result<Box<dyn ObjectBacking>, HostError>;
}

impl<F> Constructor for F
where
    F: Fn(TypeHandle, &[Parameter]) -> Result<Box<dyn ObjectBacking>, HostError> + Send + Sync,
{
    fn construct(
        &self,
        ty: TypeHandle,
        params: &[Parameter],
    ) -> Result<Box<dyn ObjectBacking>, HostError> {
        self(ty, params)
    }
}

struct TypeInfo {
    name: String,
    kind: TypeKind,
    parents: Vec<TypeHandle>,
    methods: Vec<String>,
    constructor: Option<Arc<dyn Constructor>>,
}

#[derive(Default)]
struct TypeTable {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeHandle>,
}

impl TypeTable {
    fn info(&self, ty: TypeHandle) -> Option<&TypeInfo> {
        self.types.get(ty.0 as usize)
    }

    fn insert(&mut self, info: TypeInfo) -> Result<TypeHandle, HostError> {
        if self.by_name.contains_key(&info.name) {
            return Err(HostError::DuplicateType(info.name));
        }
        let handle = TypeHandle(self.types.len() as u32);
        self.by_name.insert(info.name.clone(), handle);
        self.types.push(info);
        Ok(handle)
    }

    fn derives(&self, ty: TypeHandle, ancestor: TypeHandle) -> bool {
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if let Some(info) = self.info(current) {
                stack.extend(info.parents.iter().copied());
            }
        }
        false
    }
}

/// Registry of host types, shared by the host and the loader.
///
/// Lookups take a read lock; constructors run with no lock held so they may
/// register further types.
#[derive(Default)]
pub struct TypeRegistry {
    table: RwLock<TypeTable>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interface declaring `methods`.
    pub fn register_interface(&self, name: &str, methods: &[&str]) -> Result<TypeHandle, HostError> {
        let handle = self.table.write().insert(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Interface,
            parents: Vec::new(),
            methods: methods.iter().map(|m| (*m).to_string()).collect(),
            constructor: None,
        })?;
        debug!(type_name = name, %handle, "registered host interface");
        Ok(handle)
    }

    /// Register an instantiable type deriving from `parents`.
    pub fn register_type(
        &self,
        name: &str,
        parents: &[TypeHandle],
        constructor: Arc<dyn Constructor>,
    ) -> Result<TypeHandle, HostError> {
        let mut table = self.table.write();
        if let Some(missing) = parents.iter().find(|p| table.info(**p).is_none()) {
            return Err(HostError::UnknownType(*missing));
        }
        let handle = table.insert(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Object,
            parents: parents.to_vec(),
            methods: Vec::new(),
            constructor: Some(constructor),
        })?;
        debug!(type_name = name, %handle, "registered host type");
        Ok(handle)
    }

    /// Register `name`, or redefine it when an object type of that name is
    /// already registered. A redefined type keeps its handle; objects built
    /// from the previous definition keep their backing.
    pub fn define_type(
        &self,
        name: &str,
        parents: &[TypeHandle],
        constructor: Arc<dyn Constructor>,
    ) -> Result<TypeHandle, HostError> {
        let mut table = self.table.write();
        if let Some(missing) = parents.iter().find(|p| table.info(**p).is_none()) {
            return Err(HostError::UnknownType(*missing));
        }
        let Some(handle) = table.by_name.get(name).copied() else {
            let handle = table.insert(TypeInfo {
                name: name.to_string(),
                kind: TypeKind::Object,
                parents: parents.to_vec(),
                methods: Vec::new(),
                constructor: Some(constructor),
            })?;
            debug!(type_name = name, %handle, "registered host type");
            return Ok(handle);
        };
        if table.info(handle).map(|info| info.kind) != Some(TypeKind::Object)
            || parents.iter().any(|p| table.derives(*p, handle))
        {
            return Err(HostError::DuplicateType(name.to_string()));
        }
        let info = &mut table.types[handle.0 as usize];
        info.parents = parents.to_vec();
        info.constructor = Some(constructor);
        debug!(type_name = name, %handle, "redefined host type");
        Ok(handle)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<TypeHandle> {
        self.table.read().by_name.get(name).copied()
    }

    #[must_use]
    pub fn name(&self, ty: TypeHandle) -> Option<String> {
        self.table.read().info(ty).map(|info| info.name.clone())
    }

    #[must_use]
    pub fn kind(&self, ty: TypeHandle) -> Option<TypeKind> {
        self.table.read().info(ty).map(|info| info.kind)
    }

    /// Methods declared by `ty` and everything it derives from.
    #[must_use]
    pub fn methods(&self, ty: TypeHandle) -> Vec<String> {
        let table = self.table.read();
        let mut methods = Vec::new();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if let Some(info) = table.info(current) {
                for method in &info.methods {
                    if !methods.contains(method) {
                        methods.push(method.clone());
                    }
                }
                stack.extend(info.parents.iter().copied());
            }
        }
        methods
    }

    /// Whether `ty` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_a(&self, ty: TypeHandle, ancestor: TypeHandle) -> bool {
        self.table.read().derives(ty, ancestor)
    }

    /// Construct a new object of `ty`. The caller receives the only strong
    /// reference.
    pub fn construct(&self, ty: TypeHandle, params: &[Parameter]) -> Result<HostObject, HostError> {
        let (name, constructor) = {
            let table = self.table.read();
            let info = table.info(ty).ok_or(HostError::UnknownType(ty))?;
            match &info.constructor {
                Some(constructor) => (info.name.clone(), Arc::clone(constructor)),
                None => return Err(HostError::NotInstantiable(info.name.clone())),
            }
        };
        let backing = constructor.construct(ty, params)?;
        Ok(HostObject::new(ty, name, backing))
    }
}
