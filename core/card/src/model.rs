//! Card model: metadata, connection profile and credentials.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use idcard_common::{Error, Result};

/// Current card schema version.
pub const CURRENT_VERSION: u64 = 1;

/// Version assigned to cards written before the schema was versioned.
pub const LEGACY_VERSION: u64 = 0;

/// Connection profile file name in a card.
pub const CONNECTION_FILENAME: &str = "connection.json";

/// Metadata file name in a card.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Credentials directory name in a card.
pub const CREDENTIALS_DIRNAME: &str = "credentials";

/// Credential file name to content.
pub type Credentials = BTreeMap<String, String>;

/// Card metadata after migration to the current schema.
///
/// Keys this crate does not know about are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    /// Schema version; always [`CURRENT_VERSION`] on a constructed card.
    pub version: u64,
    /// Name of the user identity.
    pub user_name: String,
    /// Free text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the business network the card connects to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_network: Option<String>,
    /// Secret used to enroll when no credentials are stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_secret: Option<String>,
    /// Special roles such as `PeerAdmin` or `ChannelAdmin`.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub roles: Vec<String>,
    /// Unrecognised metadata keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Treat an explicit `null` list as empty.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Named connection profile.
///
/// The `name` key is guaranteed non-empty on a profile held by a card; every
/// other key is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionProfile(Map<String, Value>);

impl ConnectionProfile {
    /// Profile name, or `""` when absent.
    pub fn name(&self) -> &str {
        self.0.get("name").and_then(Value::as_str).unwrap_or("")
    }

    /// Look up a profile key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a profile key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Enrollment secret handed to a connecting system.
#[derive(Clone, PartialEq, Eq, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct EnrollmentCredentials {
    secret: String,
}

impl EnrollmentCredentials {
    /// Get the enrollment secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for EnrollmentCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnrollmentCredentials([REDACTED])")
    }
}

/// An identity card.
///
/// Bundles everything needed to connect to a business network as a specific
/// user. Instances come from [`CardModel::new`] or from one of the codecs,
/// which call it, so every card has gone through migration and validation.
#[derive(Clone, PartialEq)]
pub struct CardModel {
    metadata: CardMetadata,
    connection_profile: ConnectionProfile,
    credentials: Credentials,
}

impl CardModel {
    /// Create a card from raw metadata and a raw connection profile.
    ///
    /// # Preconditions
    /// - `metadata` is a JSON object (`null` means absent)
    /// - `connection_profile` is a JSON object with a non-empty `name`
    ///
    /// # Postconditions
    /// - Metadata is migrated to [`CURRENT_VERSION`]
    /// - Credentials are empty
    ///
    /// # Errors
    /// - `MissingMetadata` if metadata is `null`
    /// - `IncompatibleVersion` if the version cannot be migrated
    /// - `MissingField` if `userName` or the profile `name` is missing
    pub fn new(metadata: Value, connection_profile: Value) -> Result<Self> {
        let mut metadata = match metadata {
            Value::Null => return Err(Error::MissingMetadata),
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidInput(format!(
                    "Card metadata must be a JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        migrate(&mut metadata)?;

        let has_user_name = metadata
            .get("userName")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());
        if !has_user_name {
            return Err(Error::MissingField {
                scope: "metadata",
                field: "userName",
            });
        }

        let connection_profile = match connection_profile {
            Value::Object(map) => ConnectionProfile(map),
            _ => {
                return Err(Error::MissingField {
                    scope: "connection",
                    field: "name",
                })
            }
        };
        if connection_profile.name().is_empty() {
            return Err(Error::MissingField {
                scope: "connection",
                field: "name",
            });
        }

        let metadata: CardMetadata = serde_json::from_value(Value::Object(metadata))
            .map_err(|e| Error::Serialization(format!("Invalid card metadata: {}", e)))?;

        Ok(Self {
            metadata,
            connection_profile,
            credentials: Credentials::new(),
        })
    }

    /// Build a card from the parsed content of its two JSON documents.
    ///
    /// Metadata without a `version` is treated as [`LEGACY_VERSION`].
    pub(crate) fn from_documents(mut metadata: Value, connection_profile: Value) -> Result<Self> {
        if let Value::Object(map) = &mut metadata {
            let unversioned = map.get("version").map_or(true, Value::is_null);
            if unversioned {
                map.insert("version".to_string(), Value::from(LEGACY_VERSION));
            }
        }
        Self::new(metadata, connection_profile)
    }

    /// Name of the user identity associated with the card.
    pub fn user_name(&self) -> &str {
        &self.metadata.user_name
    }

    /// Free text description, or `""`.
    pub fn description(&self) -> &str {
        self.metadata.description.as_deref().unwrap_or("")
    }

    /// Business network the card applies to, or `""` for system cards.
    pub fn business_network_name(&self) -> &str {
        self.metadata.business_network.as_deref().unwrap_or("")
    }

    /// Copy of the connection profile.
    pub fn connection_profile(&self) -> ConnectionProfile {
        self.connection_profile.clone()
    }

    /// Credentials used to connect, keyed by file name.
    ///
    /// For PKI-based authentication these are typically `certificate` and
    /// `privateKey`.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Mutable access to the credentials.
    pub fn credentials_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }

    /// Replace the credentials; `None` clears them.
    pub fn set_credentials(&mut self, credentials: impl Into<Option<Credentials>>) {
        self.credentials = credentials.into().unwrap_or_default();
        debug!(
            user = %self.metadata.user_name,
            count = self.credentials.len(),
            "Credentials replaced"
        );
    }

    /// Enrollment secret, if the card carries one.
    pub fn enrollment_credentials(&self) -> Option<EnrollmentCredentials> {
        self.metadata
            .enrollment_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| EnrollmentCredentials {
                secret: secret.clone(),
            })
    }

    /// Special roles this identity can be used for.
    pub fn roles(&self) -> &[String] {
        &self.metadata.roles
    }

    /// Migrated card metadata.
    pub fn metadata(&self) -> &CardMetadata {
        &self.metadata
    }

    /// Serialize the metadata document.
    pub fn metadata_json(&self) -> Result<String> {
        serde_json::to_string(&self.metadata).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize the connection profile document.
    pub fn connection_json(&self) -> Result<String> {
        serde_json::to_string(&self.connection_profile)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl fmt::Debug for CardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardModel")
            .field("user_name", &self.metadata.user_name)
            .field("business_network", &self.metadata.business_network)
            .field("connection_profile", &self.connection_profile.name())
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parse one card document.
pub(crate) fn parse_document(file: &str, content: &str) -> Result<Value> {
    serde_json::from_str(content).map_err(|e| Error::json(file, e))
}

/// Bring metadata up to [`CURRENT_VERSION`], one version step at a time.
fn migrate(metadata: &mut Map<String, Value>) -> Result<()> {
    let mut version = match metadata.get("version") {
        None | Some(Value::Null) => LEGACY_VERSION,
        Some(value) => value.as_u64().ok_or_else(|| Error::IncompatibleVersion {
            found: value.to_string(),
            current: CURRENT_VERSION,
        })?,
    };

    if version == LEGACY_VERSION {
        match metadata.remove("enrollmentId") {
            Some(enrollment_id) => metadata.insert("userName".to_string(), enrollment_id),
            None => metadata.remove("userName"),
        };
        metadata.remove("name");
        version = 1;
        debug!("Migrated card metadata from version 0");
    }

    if version != CURRENT_VERSION {
        return Err(Error::IncompatibleVersion {
            found: version.to_string(),
            current: CURRENT_VERSION,
        });
    }

    metadata.insert("version".to_string(), Value::from(version));
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
