//! Authentication infrastructure services

pub mod revocation;
pub mod token_codec;

pub use revocation::{
    InMemoryRevocationList, RedisRevocationList, RevocationError, RevocationList,
};
pub use token_codec::TokenCodec;
