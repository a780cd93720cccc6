pub mod codec;
pub mod generator;
pub mod password;

pub use codec::{Claims, TokenCodec, TokenError, TokenKey, TokenKind, TokenPair};
pub use generator::{generate_activation_code, generate_hex, generate_id, generate_sid};
pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking, PasswordError,
};
