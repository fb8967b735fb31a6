pub mod loader;

pub use loader::{
    load_engine_policy, parse_engine_policy, validate_policy, LoadedPolicy, PolicyError,
    PolicyLoader, PolicySource,
};
