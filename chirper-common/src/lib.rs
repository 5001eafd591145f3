pub mod hashing;
pub mod model;
pub mod password;
pub mod snowflake;
pub mod util;
pub mod validation;
