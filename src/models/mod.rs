//! Data models for the project tracker.
//!
//! Wire shapes are camelCase JSON; enum values are snake_case strings, stored as TEXT.

/// Declares a closed enum stored as TEXT and serialized as its string value.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use text_enum;

mod audit;
mod comment;
mod common;
mod member;
mod notification;
mod project;
mod reports;
mod task;
mod timesheet;

pub use audit::*;
pub use comment::*;
pub use common::*;
pub use member::*;
pub use notification::*;
pub use project::*;
pub use reports::*;
pub use task::*;
pub use timesheet::*;
