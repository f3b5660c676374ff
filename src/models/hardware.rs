use serde::{Deserialize, Serialize};

use super::{HardwareCategory, ModelKey};

// ── Default sentinels ─────────────────────────────────────────────────────────

/// A field value that can be "unset": zero, blank, empty or an `Unknown` enum
/// member. The merge engine only writes into fields where this returns true.
pub trait IsDefault {
    fn is_default(&self) -> bool;
}

impl IsDefault for u32 {
    fn is_default(&self) -> bool {
        *self == 0
    }
}

impl IsDefault for f64 {
    fn is_default(&self) -> bool {
        *self == 0.0 || self.is_nan()
    }
}

impl IsDefault for String {
    fn is_default(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> IsDefault for Vec<T> {
    fn is_default(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! unknown_is_default {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl IsDefault for $ty {
                fn is_default(&self) -> bool {
                    *self == <$ty>::Unknown
                }
            }
        )+
    };
}

unknown_is_default!(FormFactor, PowerConnectorKind, UsbKind);

// ── Enums and value objects ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    #[default]
    Unknown,
    Atx,
    MicroAtx,
    MiniItx,
    EAtx,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerConnectorKind {
    #[default]
    Unknown,
    Pin6,
    Pin8,
    /// 12VHPWR (PCIe 5.0 12+4 pin)
    #[serde(rename = "pin_12vhpwr")]
    Pin12VHPWR,
    Pin16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsbKind {
    #[default]
    Unknown,
    TypeA,
    TypeC,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerConnector {
    pub kind: PowerConnectorKind,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbPort {
    pub kind: UsbKind,
    /// e.g. "3.2 Gen 2"; blank when the page doesn't say
    pub version: String,
    pub quantity: u32,
}

// ── Entities ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cpu {
    pub model_name: String,
    pub manufacturer: String,
    pub part_number: String,
    pub cores: u32,
    pub threads: u32,
    pub base_clock_ghz: f64,
    pub boost_clock_ghz: f64,
    pub l3_cache_mb: f64,
    pub tdp_watts: u32,
    pub socket: String,
    pub memory_types: Vec<String>,
    pub integrated_graphics: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gpu {
    pub model_name: String,
    pub manufacturer: String,
    pub part_number: String,
    pub chipset: String,
    pub memory_size_gb: f64,
    pub memory_type: String,
    pub memory_bus_bits: u32,
    pub boost_clock_mhz: f64,
    pub tdp_watts: u32,
    pub length_mm: f64,
    pub recommended_psu_watts: u32,
    pub power_connectors: Vec<PowerConnector>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Motherboard {
    pub model_name: String,
    pub manufacturer: String,
    pub part_number: String,
    pub socket: String,
    pub chipset: String,
    pub form_factor: FormFactor,
    pub memory_slots: u32,
    pub max_memory_gb: u32,
    pub memory_types: Vec<String>,
    pub m2_slots: u32,
    pub sata_ports: u32,
    pub usb_ports: Vec<UsbPort>,
}

/// Canonical typed record for one piece of hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum HardwareEntity {
    Cpu(Cpu),
    Gpu(Gpu),
    Motherboard(Motherboard),
}

impl HardwareEntity {
    /// A blank entity of the given category; every field at its sentinel.
    pub fn empty(category: HardwareCategory) -> Self {
        match category {
            HardwareCategory::Cpu => HardwareEntity::Cpu(Cpu::default()),
            HardwareCategory::Gpu => HardwareEntity::Gpu(Gpu::default()),
            HardwareCategory::Motherboard => HardwareEntity::Motherboard(Motherboard::default()),
        }
    }

    pub fn category(&self) -> HardwareCategory {
        match self {
            HardwareEntity::Cpu(_) => HardwareCategory::Cpu,
            HardwareEntity::Gpu(_) => HardwareCategory::Gpu,
            HardwareEntity::Motherboard(_) => HardwareCategory::Motherboard,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            HardwareEntity::Cpu(c) => &c.model_name,
            HardwareEntity::Gpu(g) => &g.model_name,
            HardwareEntity::Motherboard(m) => &m.model_name,
        }
    }

    pub fn manufacturer(&self) -> &str {
        match self {
            HardwareEntity::Cpu(c) => &c.manufacturer,
            HardwareEntity::Gpu(g) => &g.manufacturer,
            HardwareEntity::Motherboard(m) => &m.manufacturer,
        }
    }

    /// `None` until the entity has a model name.
    pub fn model_key(&self) -> Option<ModelKey> {
        ModelKey::new(self.category(), self.manufacturer(), self.model_name())
    }
}
