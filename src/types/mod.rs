//! Core data types shared across every compiler stage.

pub mod idx;
pub mod class;
pub mod tac;

pub use class::{ClassId, Classes, Kind, Method, MethodId, Type};
pub use idx::{Idx, IdxVec};
