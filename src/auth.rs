use crate::error::{MysqliteError, Result};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

pub fn stage2_from_password(password: &[u8]) -> [u8; 20] {
    let stage1 = Sha1::digest(password);
    let stage2 = Sha1::digest(stage1);
    stage2.into()
}

/// Verify the mysql_native_password token (auth_data) against the stored stage2 hash.
///
/// Stored form is SHA1(SHA1(password)) (20 bytes).
pub fn verify_native_password_token(
    salt: &[u8],
    stored_stage2: &[u8; 20],
    auth_data: &[u8],
) -> bool {
    if auth_data.len() != 20 {
        return false;
    }

    // token = stage1 XOR SHA1(salt + stage2)
    // => stage1 = token XOR SHA1(salt + stage2)
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stored_stage2);
    let salt_stage2_hash: [u8; 20] = hasher.finalize().into();

    let mut stage1 = [0u8; 20];
    for i in 0..20 {
        stage1[i] = auth_data[i] ^ salt_stage2_hash[i];
    }

    let stage2_check: [u8; 20] = Sha1::digest(stage1).into();
    stage2_check == *stored_stage2
}

/// `"*" + HEX(SHA1(SHA1(password)))`, uppercase.
pub fn native_password_hash(password: &str) -> String {
    let mut out = String::with_capacity(41);
    out.push('*');
    for b in stage2_from_password(password.as_bytes()) {
        let _ = write!(out, "{b:02X}");
    }
    out
}

/// Parses a `*`-prefixed native password hash back into its stage2 bytes.
pub fn parse_native_hash(hash: &str) -> Result<[u8; 20]> {
    let hex = hash
        .strip_prefix('*')
        .filter(|h| h.len() == 40 && h.is_ascii())
        .ok_or_else(|| MysqliteError::Invalid(format!("not a native password hash: {hash}")))?;
    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| MysqliteError::Invalid(format!("not a native password hash: {hash}")))?;
    }
    Ok(out)
}

pub fn looks_like_native_hash(s: &str) -> bool {
    s.len() == 41 && s.starts_with('*')
}

/// Scramble sent in the handshake. Printable and never `$`, which some
/// clients treat as a separator.
pub fn generate_salt() -> [u8; 20] {
    let mut salt = [0u8; 20];
    let mut rng = OsRng;
    for b in salt.iter_mut() {
        *b = loop {
            let c: u8 = rng.gen_range(33..127);
            if c != b'$' {
                break c;
            }
        };
    }
    salt
}

/// One accepted credential for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Clear(String),
    NativeHash([u8; 20]),
}

impl Credential {
    pub fn verify(&self, salt: &[u8], auth_data: &[u8]) -> bool {
        match self {
            // Clients send no scramble at all for an empty password.
            Credential::Clear(password) if password.is_empty() => auth_data.is_empty(),
            Credential::Clear(password) => verify_native_password_token(
                salt,
                &stage2_from_password(password.as_bytes()),
                auth_data,
            ),
            Credential::NativeHash(stage2) => verify_native_password_token(salt, stage2, auth_data),
        }
    }
}

/// A user entry as configured in memory: either field may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserEntry {
    pub password_clear: Option<String>,
    pub password_hash: Option<String>,
}

impl UserEntry {
    /// Interprets a password given on the command line: a 41-character
    /// `*`-prefixed value is a native hash.
    pub fn from_password(password: &str) -> Self {
        if looks_like_native_hash(password) {
            Self {
                password_clear: None,
                password_hash: Some(password.to_string()),
            }
        } else {
            Self {
                password_clear: Some(password.to_string()),
                password_hash: None,
            }
        }
    }
}

/// Entry of the credentials file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileEntry {
    #[serde(rename = "Password", default, skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(
        rename = "MysqlNativePassword",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    mysql_native_password: String,
    #[serde(rename = "UserData", default, skip_serializing_if = "String::is_empty")]
    user_data: String,
}

/// Credentials loaded once from JSON: `{"user": [{"Password": ..}, {"MysqlNativePassword": ..}]}`.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    users: HashMap<String, Vec<Credential>>,
}

impl StaticAuth {
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<FileEntry>> = serde_json::from_str(json)?;
        let mut users = HashMap::with_capacity(parsed.len());
        for (user, entries) in parsed {
            let mut creds = Vec::with_capacity(entries.len());
            for entry in entries {
                if !entry.mysql_native_password.is_empty() {
                    creds.push(Credential::NativeHash(parse_native_hash(
                        &entry.mysql_native_password,
                    )?));
                } else {
                    creds.push(Credential::Clear(entry.password));
                }
            }
            users.insert(user, creds);
        }
        Ok(Self { users })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Builds the same JSON document a credentials file holds and loads it.
    pub fn from_users(users: &BTreeMap<String, Vec<UserEntry>>) -> Result<Self> {
        let doc: BTreeMap<&str, Vec<FileEntry>> = users
            .iter()
            .map(|(name, entries)| {
                let entries = entries
                    .iter()
                    .map(|e| FileEntry {
                        password: e.password_clear.clone().unwrap_or_default(),
                        mysql_native_password: e.password_hash.clone().unwrap_or_default(),
                        user_data: name.clone(),
                    })
                    .collect();
                (name.as_str(), entries)
            })
            .collect();
        Self::from_json(&serde_json::to_string(&doc)?)
    }

    pub fn verify(&self, user: &str, salt: &[u8], auth_data: &[u8]) -> bool {
        self.users
            .get(user)
            .is_some_and(|creds| creds.iter().any(|c| c.verify(salt, auth_data)))
    }
}

/// How connections are authenticated. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    AcceptAll,
    Static(StaticAuth),
}

impl AuthStrategy {
    /// A credentials file wins over an in-memory table; neither means every
    /// connection is accepted.
    pub fn select(
        auth_file: Option<&Path>,
        users: Option<&BTreeMap<String, Vec<UserEntry>>>,
    ) -> Result<Self> {
        match (auth_file, users) {
            (Some(path), _) => Ok(AuthStrategy::Static(StaticAuth::from_file(path)?)),
            (None, Some(users)) => Ok(AuthStrategy::Static(StaticAuth::from_users(users)?)),
            (None, None) => Ok(AuthStrategy::AcceptAll),
        }
    }

    pub fn authenticate(&self, plugin: &str, user: &str, salt: &[u8], auth_data: &[u8]) -> bool {
        match self {
            AuthStrategy::AcceptAll => true,
            AuthStrategy::Static(auth) => {
                plugin == NATIVE_PASSWORD_PLUGIN && auth.verify(user, salt, auth_data)
            }
        }
    }
}
