#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod collector;
mod control;
mod enumerator;
mod group;
mod input;
mod memlock;
mod verifier;

pub use self::collector::*;
pub use self::control::*;
pub use self::enumerator::*;
pub use self::group::*;
pub use self::input::*;
pub use self::memlock::*;
pub use self::verifier::*;
