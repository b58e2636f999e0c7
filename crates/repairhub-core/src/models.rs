//! Domain models for RepairHub.
//!
//! Every status/role field is a closed enum. Wire strings are parsed at
//! the boundary with [`std::str::FromStr`]; unknown values are rejected
//! with [`HubError::Validation`](crate::error::HubError::Validation).

pub mod audit;
pub mod change;
pub mod device;
pub mod identity;
pub mod payment;
pub mod pricing;
pub mod profile;
pub mod repair;
pub mod replacement;
pub mod warranty;

/// Implements `as_str`, `Display` and a validating `FromStr` for a
/// fieldless enum, mapping each variant to its snake_case wire string.
macro_rules! wire_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::error::HubError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($ty::$variant),)+
                    other => Err($crate::error::HubError::validation(format!(
                        "unknown {}: '{other}' (expected one of: {})",
                        $label,
                        [$($wire),+].join(", ")
                    ))),
                }
            }
        }
    };
}

pub(crate) use wire_enum;
