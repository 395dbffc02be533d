//! API metadata and the method dispatch table built from it.
//!
//! The peer describes itself once per connection through `nvim_get_api_info`
//! (or `vim_get_api_info` on old peers): object types and their ext codes,
//! error types, and every function with its parameters. Nothing here is
//! hard-coded; both the `nvim_buf_get_lines` and `buffer_get_line_slice`
//! vocabularies resolve through the same tables.

use crate::config::RpcConfig;
use crate::{NvimError, Result};
use rmpv::Value;
use serde::Deserialize;
use std::collections::HashMap;

/// Version block of the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiVersion {
    #[serde(default)]
    pub major: u64,
    #[serde(default)]
    pub minor: u64,
    #[serde(default)]
    pub patch: u64,
    #[serde(default)]
    pub api_level: u64,
    #[serde(default)]
    pub api_compatible: u64,
    #[serde(default)]
    pub api_prerelease: bool,
}

/// A remote object type (Buffer, Window, Tabpage, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    pub name: String,
    /// msgpack ext type code used on the wire.
    pub code: i8,
    /// Prefix of the functions that take this type as receiver.
    pub prefix: String,
}

/// One function exposed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    /// `(type, name)` pairs.
    pub parameters: Vec<(String, String)>,
    pub return_type: String,
    /// Name of the object type this function is a method of.
    pub receiver: Option<String>,
    pub since: Option<u64>,
    pub deprecated_since: Option<u64>,
}

impl FunctionSpec {
    pub fn is_deprecated(&self) -> bool {
        self.deprecated_since.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    version: Option<ApiVersion>,
    #[serde(default)]
    functions: Vec<RawFunction>,
    #[serde(default)]
    types: HashMap<String, RawType>,
    #[serde(default)]
    error_types: HashMap<String, RawErrorType>,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    parameters: Vec<(String, String)>,
    #[serde(default)]
    return_type: String,
    #[serde(default)]
    method: Option<bool>,
    #[serde(default)]
    since: Option<u64>,
    #[serde(default)]
    deprecated_since: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawType {
    id: i8,
    #[serde(default)]
    prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawErrorType {
    id: i64,
}

/// Parsed metadata plus lookup tables. Immutable once built.
#[derive(Debug, Clone)]
pub struct ApiInfo {
    channel_id: Option<u64>,
    version: Option<ApiVersion>,
    types: Vec<ObjectType>,
    error_types: HashMap<i64, String>,
    functions: Vec<FunctionSpec>,
    by_name: HashMap<String, usize>,
    /// Prefix-stripped names of global functions (`get_current_buf`).
    global: HashMap<String, usize>,
    /// `(type code, method name)` for functions with a receiver (`get_lines`).
    scoped: HashMap<(i8, String), usize>,
}

impl ApiInfo {
    /// Parse the result of `nvim_get_api_info`: `[channel_id, metadata]`.
    ///
    /// A bare metadata map is also accepted, in which case the channel id is
    /// unknown.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                let channel = items.next().unwrap_or(Value::Nil);
                let metadata = items.next().unwrap_or(Value::Nil);
                let channel_id = channel.as_u64().ok_or_else(|| NvimError::Metadata {
                    message: format!("channel id is not an integer: {}", channel),
                })?;
                Self::from_metadata(Some(channel_id), metadata)
            }
            map @ Value::Map(_) => Self::from_metadata(None, map),
            other => Err(NvimError::Metadata {
                message: format!("expected [channel_id, metadata], got {}", other),
            }),
        }
    }

    /// Build from the metadata map itself.
    pub fn from_metadata(channel_id: Option<u64>, metadata: Value) -> Result<Self> {
        let raw: RawMetadata =
            rmpv::ext::from_value(metadata).map_err(|err| NvimError::Metadata {
                message: err.to_string(),
            })?;

        let mut types: Vec<ObjectType> = raw
            .types
            .into_iter()
            .map(|(name, ty)| ObjectType {
                prefix: ty
                    .prefix
                    .unwrap_or_else(|| format!("{}_", name.to_ascii_lowercase())),
                code: ty.id,
                name,
            })
            .collect();
        types.sort_by_key(|ty| ty.code);

        let error_types = raw
            .error_types
            .into_iter()
            .map(|(name, ty)| (ty.id, name))
            .collect();

        let functions: Vec<FunctionSpec> = raw
            .functions
            .into_iter()
            .map(|function| {
                let receiver = receiver_type(&types, &function).map(str::to_string);
                FunctionSpec {
                    name: function.name,
                    parameters: function.parameters,
                    return_type: function.return_type,
                    receiver,
                    since: function.since,
                    deprecated_since: function.deprecated_since,
                }
            })
            .collect();

        let mut info = Self {
            channel_id,
            version: raw.version,
            types,
            error_types,
            functions,
            by_name: HashMap::new(),
            global: HashMap::new(),
            scoped: HashMap::new(),
        };
        info.index();
        Ok(info)
    }

    fn index(&mut self) {
        // Lower rank wins when `nvim_x` and `vim_x` both exist.
        let mut global_rank: HashMap<String, usize> = HashMap::new();

        for (idx, function) in self.functions.iter().enumerate() {
            self.by_name.insert(function.name.clone(), idx);

            for (rank, prefix) in RpcConfig::GLOBAL_PREFIXES.iter().enumerate() {
                if let Some(short) = function.name.strip_prefix(prefix) {
                    let better = global_rank.get(short).map_or(true, |best| rank < *best);
                    if better {
                        global_rank.insert(short.to_string(), rank);
                        self.global.insert(short.to_string(), idx);
                    }
                }
            }

            let scoped = function.receiver.as_deref().and_then(|receiver| {
                self.types.iter().find(|ty| ty.name == receiver)
            });
            if let Some(ty) = scoped {
                if let Some(short) = function.name.strip_prefix(&ty.prefix) {
                    self.scoped.insert((ty.code, short.to_string()), idx);
                }
            }
        }
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.channel_id
    }

    pub fn version(&self) -> Option<&ApiVersion> {
        self.version.as_ref()
    }

    /// Object types, ordered by ext code.
    pub fn types(&self) -> &[ObjectType] {
        &self.types
    }

    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Look up a type by its ext code.
    pub fn object_type(&self, code: i8) -> Option<&ObjectType> {
        self.types.iter().find(|ty| ty.code == code)
    }

    /// Look up a type by name (`Buffer`).
    pub fn object_type_named(&self, name: &str) -> Option<&ObjectType> {
        self.types.iter().find(|ty| ty.name == name)
    }

    /// Name of the error type with the given id (`Exception`, `Validation`).
    pub fn error_type_name(&self, code: i64) -> Option<&str> {
        self.error_types.get(&code).map(String::as_str)
    }

    /// Resolve a method name: exact full name first, then a short name with the
    /// global prefix stripped.
    pub fn resolve(&self, method: &str) -> Option<&FunctionSpec> {
        self.by_name
            .get(method)
            .or_else(|| self.global.get(method))
            .map(|idx| &self.functions[*idx])
    }

    /// Resolve a method on an object of type `code`: the name without the type
    /// prefix, or the full name of a function taking that type as receiver.
    pub fn resolve_scoped(&self, code: i8, method: &str) -> Option<&FunctionSpec> {
        if let Some(idx) = self.scoped.get(&(code, method.to_string())) {
            return Some(&self.functions[*idx]);
        }

        let ty = self.object_type(code)?;
        self.by_name
            .get(method)
            .map(|idx| &self.functions[*idx])
            .filter(|function| function.receiver.as_deref() == Some(ty.name.as_str()))
    }

    /// Whether a method resolves, globally or on any object type.
    pub fn has_function(&self, method: &str) -> bool {
        self.resolve(method).is_some()
    }
}

/// Determine the receiver type of a function.
///
/// Newer metadata marks methods explicitly; older metadata only lists the
/// first parameter, so a function is a method when its first parameter is an
/// object type and its name carries that type's prefix.
fn receiver_type<'a>(types: &'a [ObjectType], function: &RawFunction) -> Option<&'a str> {
    if function.method == Some(false) {
        return None;
    }

    let (first_type, _) = function.parameters.first()?;
    let ty = types.iter().find(|ty| &ty.name == first_type)?;

    match function.method {
        Some(true) => Some(ty.name.as_str()),
        _ if function.name.starts_with(&ty.prefix) => Some(ty.name.as_str()),
        _ => None,
    }
}
