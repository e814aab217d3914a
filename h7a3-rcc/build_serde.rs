use serde::{Deserialize, Serialize};

// ---------- peripherals.yaml ----------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peripherals {
    pub peripherals: Vec<Peripheral>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peripheral {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Clock domain feeding the kernel clock, e.g. `apb1_timer`.
    pub clock: String,
}
