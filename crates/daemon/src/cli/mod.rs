pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Compute, GenerateKeypair, Health, Info, Init, Recrypt, User, Version};
