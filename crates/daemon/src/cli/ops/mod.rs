pub mod compute;
pub mod generate_keypair;
pub mod health;
pub mod info;
pub mod init;
pub mod recrypt;
pub mod user;
pub mod version;

pub use compute::Compute;
pub use generate_keypair::GenerateKeypair;
pub use health::Health;
pub use info::Info;
pub use init::Init;
pub use recrypt::Recrypt;
pub use user::User;
pub use version::Version;
