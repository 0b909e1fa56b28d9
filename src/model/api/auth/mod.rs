mod credentials;
mod token;
mod user;

pub use credentials::{Credentials, Registration, MIN_PASSWORD_LENGTH};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Admin, Caller, Rights, Role, UserDescription, Voter};
