use super::types::{DiscoveryOptions, DiscoveryOutcome};
use crate::spi::types::DiscoveryError;

pub trait DiscoveryEngine {
    fn discover(&self, options: &DiscoveryOptions) -> Result<DiscoveryOutcome, DiscoveryError>;
}

pub trait Reporter {
    fn report(&self, outcome: &DiscoveryOutcome) -> String;
}
