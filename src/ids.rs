use std::borrow::Borrow;
use std::fmt;

use uuid::Uuid;

/// Generates a fresh, globally-unique hex identifier.
///
/// This stands in for the host GUID function the original implementation
/// relies on for both identifier assignment and password hashing salts.
pub(crate) fn new_guid() -> String {
    Uuid::new_v4().simple().to_string()
}

macro_rules! define_iden_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Wraps a trusted, already-assigned identifier string.
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generates a fresh identifier.
            pub(crate) fn generate() -> Self {
                Self(crate::ids::new_guid())
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_iden_type!(
    /// Opaque, immutable identifier of a [`crate::user::User`].
    UserIden
);
define_iden_type!(
    /// Opaque, immutable identifier of a [`crate::role::Role`].
    RoleIden
);
define_iden_type!(
    /// Opaque, immutable identifier of an [`crate::gate::AuthGate`].
    GateIden
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_idens_are_unique() {
        let a = UserIden::generate();
        let b = UserIden::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn iden_borrows_as_str_for_map_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<UserIden, u8> = HashMap::new();
        map.insert(UserIden::from_string("abc"), 1);
        assert_eq!(map.get("abc"), Some(&1));
    }
}
