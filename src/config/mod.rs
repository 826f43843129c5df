pub mod hub_config;

pub use hub_config::{
    load_hub_config, BusSection, ChannelOverride, DiscoverySection, HubConfig, PollingSection,
    ReportOutput, ReportSection,
};
