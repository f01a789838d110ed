//! Stable command identifiers and reply statuses.

use std::fmt;

/// Interface token every service request starts with.
pub const INTERFACE_TOKEN: &str = "datashare.IDataShareService";

/// Interface token every observer callback starts with.
pub const OBSERVER_TOKEN: &str = "datashare.IDataShareObserver";

/// Sentinel returned by count-returning proxy calls when the round-trip failed.
pub const DATA_SHARE_ERROR: i32 = -1;

/// Reply statuses written by the stub before the reply payload.
pub mod status {
    pub const OK: i32 = 0;
    pub const ERR_UNKNOWN_COMMAND: i32 = -100;
    pub const ERR_INVALID_DATA: i32 = -101;
    pub const ERR_INTERNAL: i32 = -102;
    /// The handler's reply did not fit in one frame.
    pub const ERR_REPLY_TOO_LARGE: i32 = -103;
}

macro_rules! command_table {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> u32 {
                self as u32
            }

            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

command_table! {
    /// Operations of the data-share service. The numeric id is what crosses
    /// the wire.
    DataShareCommand {
        Insert = 0,
        Update = 1,
        Delete = 2,
        Query = 3,
        AddTemplate = 4,
        DelTemplate = 5,
        Publish = 6,
        GetPublishedData = 7,
        SubscribeRdb = 8,
        UnsubscribeRdb = 9,
        EnableSubscribeRdb = 10,
        DisableSubscribeRdb = 11,
        SubscribePublished = 12,
        UnsubscribePublished = 13,
        EnableSubscribePublished = 14,
        DisableSubscribePublished = 15,
        NotifyObservers = 16,
        BatchInsert = 17,
        RegisterObserver = 18,
        UnregisterObserver = 19,
        NormalizeUri = 20,
        DenormalizeUri = 21,
        GetType = 22,
    }
}

command_table! {
    /// Callbacks pushed from a provider to an observer host.
    ObserverCommand {
        OnChange = 1,
        OnRdbChange = 2,
        OnPublishedChange = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_stable() {
        assert_eq!(DataShareCommand::Insert.code(), 0);
        assert_eq!(DataShareCommand::NotifyObservers.code(), 16);
        assert_eq!(DataShareCommand::GetType.code(), 22);
        assert_eq!(DataShareCommand::ALL.len(), 23);
    }

    #[test]
    fn test_from_code_round_trip() {
        for cmd in DataShareCommand::ALL {
            assert_eq!(DataShareCommand::from_code(cmd.code()), Some(*cmd));
        }
        assert_eq!(DataShareCommand::from_code(23), None);
        assert_eq!(DataShareCommand::from_code(u32::MAX), None);
    }

    #[test]
    fn test_observer_commands() {
        assert_eq!(ObserverCommand::from_code(0), None);
        assert_eq!(ObserverCommand::from_code(2), Some(ObserverCommand::OnRdbChange));
        assert_eq!(ObserverCommand::OnPublishedChange.to_string(), "OnPublishedChange");
    }
}
