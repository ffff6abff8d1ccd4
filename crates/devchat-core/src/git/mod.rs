mod identity;

pub use identity::GitIdentity;
