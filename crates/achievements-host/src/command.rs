//! Console commands read from stdin, one per line.
//!
//! ```text
//! progress <kind> <amount>   add progress through the handler for <kind>
//! claim <achievement>        dispense the reward of a completed achievement
//! refresh <group>            rotate a timed group now
//! status                     print every live achievement
//! save                       write the snapshot file
//! quit                       save and exit
//! ```

use std::str::FromStr;

use achievements_types::{AchievementId, ConfigKind, GroupId};

use crate::error::HostError;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add progress to every achievement of a kind.
    Progress {
        /// Configuration kind.
        kind: ConfigKind,
        /// Amount to add.
        amount: u32,
    },
    /// Dispense the reward of an achievement.
    Claim {
        /// The achievement.
        id: AchievementId,
    },
    /// Force a timed group to rotate.
    Refresh {
        /// The group.
        group: GroupId,
    },
    /// Print the live achievements.
    Status,
    /// Write the snapshot file.
    Save,
    /// Save and exit.
    Quit,
}

impl FromStr for Command {
    type Err = HostError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(HostError::Command("empty line".to_owned()));
        };
        let args: Vec<&str> = words.collect();

        match (verb, args.as_slice()) {
            ("progress", [kind, amount]) => {
                let amount = amount
                    .parse()
                    .map_err(|e| HostError::Command(format!("invalid amount '{amount}': {e}")))?;
                Ok(Self::Progress {
                    kind: ConfigKind::new(*kind),
                    amount,
                })
            }
            ("claim", [id]) => Ok(Self::Claim {
                id: AchievementId::new(*id),
            }),
            ("refresh", [group]) => Ok(Self::Refresh {
                group: GroupId::new(*group),
            }),
            ("status", []) => Ok(Self::Status),
            ("save", []) => Ok(Self::Save),
            ("quit" | "exit", []) => Ok(Self::Quit),
            _ => Err(HostError::Command(format!("unrecognized command '{line}'"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        assert_eq!(
            "progress kills 3".parse::<Command>().unwrap(),
            Command::Progress {
                kind: ConfigKind::new("kills"),
                amount: 3,
            }
        );
        assert_eq!(
            "claim first_blood".parse::<Command>().unwrap(),
            Command::Claim {
                id: AchievementId::new("first_blood"),
            }
        );
        assert_eq!(
            "  refresh   daily ".parse::<Command>().unwrap(),
            Command::Refresh {
                group: GroupId::new("daily"),
            }
        );
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("save".parse::<Command>().unwrap(), Command::Save);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!("".parse::<Command>().is_err());
        assert!("progress kills".parse::<Command>().is_err());
        assert!("progress kills many".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }
}
