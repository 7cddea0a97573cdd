mod contact;
mod contact_method;

pub use contact::{Contact, ContactStats, ContactWithMethods};
pub use contact_method::{ContactMethod, MethodEntry, MethodInput};
