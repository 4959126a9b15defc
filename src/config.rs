use std::time::Duration;

use crate::diag::DEFAULT_LOG_CAPACITY;
use crate::handlers::Domain;
use crate::layout::LayoutConstants;

/// Raw value ranges each handler maps onto its visual range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domains {
    pub stick: Domain,
    pub stick_trim: Domain,
    pub rudder: Domain,
    pub rudder_trim: Domain,
    pub brake: Domain,
    pub lever: Domain,
}

impl Default for Domains {
    fn default() -> Self {
        Self {
            stick: Domain::SIGNED,
            stick_trim: Domain::SIGNED,
            rudder: Domain::SIGNED,
            rudder_trim: Domain::SIGNED,
            brake: Domain::UNIT,
            lever: Domain::UNIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub domains: Domains,
    pub layout: LayoutConstants,

    // delay before re-measuring after the panel is popped out or docked
    pub resize_delay: Duration,

    pub asset_base: String,
    pub log_capacity: usize,

    // SimConnect
    pub client_name: String,
    pub reconnect_delay: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            domains: Domains::default(),
            layout: LayoutConstants::default(),
            resize_delay: Duration::from_micros(100),
            asset_base: "/InGamePanels/InputViewer/images/".to_string(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            client_name: "InputViewer".to_string(),
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

impl ViewerConfig {
    pub fn asset(&self, file: &str) -> String {
        format!("{}{}", self.asset_base, file)
    }
}
