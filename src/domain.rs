mod activation_code;
mod email_address;
mod person_name;

pub use activation_code::ActivationCode;
pub use email_address::EmailAddress;
pub use person_name::PersonName;
