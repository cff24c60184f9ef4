//! Command decoding
//!
//! A request is decoded once into a [`Command`]; arity and argument types are
//! checked here so execution only deals with well-formed commands.

use super::CommandError;
use crate::model::{Id, VersionId};
use crate::router::PartitionId;

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List keys matching a glob pattern, from the given partitions or all
    Keys {
        pattern: String,
        partitions: Option<Vec<PartitionId>>,
    },
    Set { key: Id, value: Vec<u8> },
    Get { key: Id },
    GetV { key: Id, version: VersionId },
    /// Delete a whole key, or one version of it
    Delete {
        key: Id,
        version: Option<VersionId>,
    },
    Versions { key: Id },
    Manage(ManageCommand),
}

/// Management subcommands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManageCommand {
    /// Drop partitions from the routing table
    Remove(Vec<PartitionId>),
    /// List active partitions
    Partitions,
    /// Reserved, does nothing
    Purge,
    /// Reserved, does nothing beyond checking the source partition exists
    Rebalance(PartitionId),
}

impl Command {
    /// Decode a request (command name followed by arguments)
    pub fn parse(request: &[Vec<u8>]) -> Result<Self, CommandError> {
        let Some((name, args)) = request.split_first() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();

        match name.as_str() {
            "keys" | "k" => {
                let (pattern, partitions) = args.split_first().ok_or_else(|| arity("keys"))?;
                let pattern = String::from_utf8(pattern.clone())
                    .map_err(|_| CommandError::Parse("pattern is not valid UTF-8".to_string()))?;
                let partitions = if partitions.is_empty() {
                    None
                } else {
                    Some(parse_partitions(partitions)?)
                };
                Ok(Command::Keys {
                    pattern,
                    partitions,
                })
            }
            "set" | "s" => match args {
                [key, value] => Ok(Command::Set {
                    key: Id::from(key.as_slice()),
                    value: value.clone(),
                }),
                _ => Err(arity("set")),
            },
            "get" | "g" => match args {
                [key] => Ok(Command::Get {
                    key: Id::from(key.as_slice()),
                }),
                _ => Err(arity("get")),
            },
            "getv" => match args {
                [key, version] => Ok(Command::GetV {
                    key: Id::from(key.as_slice()),
                    version: parse_version(version)?,
                }),
                _ => Err(arity("getv")),
            },
            "delete" | "del" | "d" => match args {
                [key] => Ok(Command::Delete {
                    key: Id::from(key.as_slice()),
                    version: None,
                }),
                [key, version] => Ok(Command::Delete {
                    key: Id::from(key.as_slice()),
                    version: Some(parse_version(version)?),
                }),
                _ => Err(arity("delete")),
            },
            "versions" => match args {
                [key] => Ok(Command::Versions {
                    key: Id::from(key.as_slice()),
                }),
                _ => Err(arity("versions")),
            },
            "manage" | "admin" => ManageCommand::parse(args).map(Command::Manage),
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    /// Canonical command name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Keys { .. } => "KEYS",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::GetV { .. } => "GETV",
            Command::Delete { .. } => "DELETE",
            Command::Versions { .. } => "VERSIONS",
            Command::Manage(_) => "MANAGE",
        }
    }
}

impl ManageCommand {
    fn parse(args: &[Vec<u8>]) -> Result<Self, CommandError> {
        let (sub, rest) = args.split_first().ok_or_else(|| arity("manage"))?;
        let sub = String::from_utf8_lossy(sub).to_ascii_lowercase();

        match sub.as_str() {
            "remove" => {
                if rest.is_empty() {
                    return Err(arity("manage remove"));
                }
                Ok(ManageCommand::Remove(parse_partitions(rest)?))
            }
            "partitions" => Ok(ManageCommand::Partitions),
            "purge" => Ok(ManageCommand::Purge),
            "rebalance" => match rest {
                [from] => Ok(ManageCommand::Rebalance(parse_partition(from)?)),
                _ => Err(arity("manage rebalance")),
            },
            _ => Err(CommandError::UnknownCommand(format!("manage {}", sub))),
        }
    }
}

fn arity(command: &str) -> CommandError {
    CommandError::Arity {
        command: command.to_string(),
    }
}

fn parse_version(raw: &[u8]) -> Result<VersionId, CommandError> {
    VersionId::parse(raw).map_err(|e| CommandError::Parse(e.to_string()))
}

fn parse_partition(arg: &[u8]) -> Result<PartitionId, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<PartitionId>().ok())
        .ok_or_else(|| {
            CommandError::Parse(format!(
                "invalid partition '{}'",
                String::from_utf8_lossy(arg)
            ))
        })
}

/// Partition ids, in order of first appearance
fn parse_partitions(raw: &[Vec<u8>]) -> Result<Vec<PartitionId>, CommandError> {
    let mut ids = Vec::with_capacity(raw.len());
    for arg in raw {
        let id = parse_partition(arg)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
