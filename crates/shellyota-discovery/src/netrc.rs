//! Minimal `.netrc` machine table
//!
//! Only the subset the credential resolver consumes: `machine` entries
//! with `login`/`password` tokens, plus the `default` entry. Macro
//! definitions and the `account` token are accepted and ignored.

use std::collections::HashMap;

use thiserror::Error;

/// Errors produced while parsing a netrc file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetrcError {
    /// A keyword was not followed by its value
    #[error("netrc: keyword {0:?} has no value")]
    MissingValue(String),

    /// A login/password token appeared outside a machine entry
    #[error("netrc: token {0:?} outside a machine entry")]
    OrphanToken(String),
}

/// Credentials recorded for one machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    /// The `login` value, may be empty
    pub login: String,
    /// The `password` value, may be empty
    pub password: String,
}

/// A parsed netrc credentials table.
#[derive(Debug, Clone, Default)]
pub struct Netrc {
    machines: HashMap<String, Machine>,
    default: Option<Machine>,
}

impl Netrc {
    /// Parses netrc file contents.
    pub fn parse(content: &str) -> Result<Self, NetrcError> {
        let mut netrc = Netrc::default();
        let mut current: Option<String> = None;
        let mut in_default = false;

        let mut tokens = content.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "machine" => {
                    let name = tokens
                        .next()
                        .ok_or_else(|| NetrcError::MissingValue(token.to_string()))?;
                    netrc.machines.insert(name.to_string(), Machine::default());
                    current = Some(name.to_string());
                    in_default = false;
                }
                "default" => {
                    netrc.default = Some(Machine::default());
                    current = None;
                    in_default = true;
                }
                "login" | "password" | "account" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| NetrcError::MissingValue(token.to_string()))?;

                    let entry = if in_default {
                        netrc.default.as_mut()
                    } else {
                        current.as_ref().and_then(|name| netrc.machines.get_mut(name))
                    };

                    let Some(entry) = entry else {
                        return Err(NetrcError::OrphanToken(token.to_string()));
                    };

                    match token {
                        "login" => entry.login = value.to_string(),
                        "password" => entry.password = value.to_string(),
                        _ => {}
                    }
                }
                // Macro definitions run to the next blank line; nothing
                // in them is credential material, so skip tokens until a
                // recognised keyword shows up again.
                "macdef" => {
                    let _ = tokens.next();
                }
                _ => {}
            }
        }

        Ok(netrc)
    }

    /// Looks up the entry for a machine, falling back to the `default`
    /// entry when present.
    pub fn machine(&self, host: &str) -> Option<&Machine> {
        self.machines.get(host).or(self.default.as_ref())
    }

    /// Looks up the entry for a machine without the default fallback.
    pub fn machine_exact(&self, host: &str) -> Option<&Machine> {
        self.machines.get(host)
    }
}
