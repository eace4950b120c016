//! Upload & reference resolution.
//!
//! Uploads get a fresh name (`[namespace/]{unix millis}-{random}.{ext}`), are
//! written create-only, and their public locator is derived from the store's
//! public base and that name. Nothing is ever written twice under a name.

use std::fmt;

use bytes::Bytes;
use rand::Rng;
use smol_str::{SmolStr, format_smolstr};
use url::Url;

use crate::codec::extension_for;
use crate::error::UploadError;
use crate::store::ObjectStore;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 10;

/// A stable, publicly fetchable reference to a stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(SmolStr);

impl Locator {
    pub fn new(url: impl Into<SmolStr>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Url> for Locator {
    fn from(url: Url) -> Self {
        Self(SmolStr::new(url.as_str()))
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub name: SmolStr,
    pub locator: Locator,
}

/// Generates collision-resistant object names.
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    namespace: Option<SmolStr>,
}

impl NameGenerator {
    /// Prefix generated names with an actor/session identifier. Characters
    /// outside `[A-Za-z0-9_-]` are replaced with `-`.
    pub fn with_namespace(namespace: &str) -> Self {
        let cleaned: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        Self {
            namespace: (!cleaned.is_empty()).then(|| SmolStr::new(cleaned)),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn generate(&self, extension: &str) -> SmolStr {
        let millis = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::rng();
        let random: String = (0..RANDOM_LEN)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        match &self.namespace {
            Some(ns) => format_smolstr!("{ns}/{millis}-{random}.{extension}"),
            None => format_smolstr!("{millis}-{random}.{extension}"),
        }
    }
}

/// Persists assets to an [`ObjectStore`] and resolves their public locators.
#[derive(Debug, Clone)]
pub struct AssetResolver<S> {
    store: S,
    public_base: Url,
    names: NameGenerator,
}

impl<S: ObjectStore> AssetResolver<S> {
    /// `public_base` must end with `/` for names to join beneath it;
    /// [`presswork_common::StorageConfig::public_base_url`] normalises this.
    pub fn new(store: S, public_base: Url) -> Self {
        Self {
            store,
            public_base,
            names: NameGenerator::default(),
        }
    }

    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upload `bytes` under a freshly generated name.
    pub async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<UploadRecord, UploadError> {
        let name = self.names.generate(extension_for(content_type));
        let len = bytes.len();
        self.store.put_new(&name, bytes, content_type).await?;
        let locator = self.resolve_public_locator(&name)?;
        tracing::info!(%name, %locator, len, "uploaded asset");
        Ok(UploadRecord { name, locator })
    }

    /// Deterministically derive the public locator for a stored name.
    pub fn resolve_public_locator(&self, name: &str) -> Result<Locator, UploadError> {
        self.public_base
            .join(name)
            .map(Locator::from)
            .map_err(|e| UploadError::Locator {
                name: name.to_string(),
                message: e.to_string(),
            })
    }
}
