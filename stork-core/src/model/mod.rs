pub mod app;
pub mod daemon;
pub mod event;
pub mod ha;
pub mod host;
pub mod ids;
pub mod lease;
pub mod machine;
pub mod network;
pub mod stats;

pub use app::{AccessPoint, AccessPointKind, App, AppKind};
pub use daemon::{Daemon, DaemonName};
pub use event::{Event, Level, Relations};
pub use ha::{HaRole, HaStatus, HaState};
pub use host::{Host, HostDataSource, HostIdentifier, IdentifierKind, IpReservation, LocalHost};
pub use ids::{AppId, DaemonId, HostId, MachineId, SharedNetworkId, SubnetId, UserId};
pub use lease::{Lease, LeaseState};
pub use machine::Machine;
pub use network::{AddressPool, Family, LocalSubnet, PrefixPool, SharedNetwork, Subnet};
pub use stats::{StatValue, SubnetStats};
