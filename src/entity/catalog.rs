//! Static catalogs for entity configuration: providers, regions, machine
//! classes, sensor and panel hardware. Capacity figures are looked up here
//! rather than randomized so a derived config is always internally
//! consistent (declared RAM matches the chosen instance class).

/// Cloud providers an entity can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }
}

/// A machine class with fixed capacity figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineClass {
    pub name: &'static str,
    pub vcpus: u16,
    pub memory_bytes: u64,
}

const GIB: u64 = 1024 * 1024 * 1024;

/// Fallback used when a class lookup fails; keeps derivation total.
pub const FALLBACK_CLASS: MachineClass = MachineClass {
    name: "standard-2",
    vcpus: 2,
    memory_bytes: 8 * GIB,
};

const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-2",
];

const AWS_CLASSES: &[MachineClass] = &[
    MachineClass {
        name: "m5.large",
        vcpus: 2,
        memory_bytes: 8 * GIB,
    },
    MachineClass {
        name: "m5.xlarge",
        vcpus: 4,
        memory_bytes: 16 * GIB,
    },
    MachineClass {
        name: "c5.2xlarge",
        vcpus: 8,
        memory_bytes: 16 * GIB,
    },
    MachineClass {
        name: "r5.xlarge",
        vcpus: 4,
        memory_bytes: 32 * GIB,
    },
    MachineClass {
        name: "c5.4xlarge",
        vcpus: 16,
        memory_bytes: 32 * GIB,
    },
];

const GCP_REGIONS: &[&str] = &[
    "us-central1",
    "us-east4",
    "europe-west1",
    "europe-west4",
    "asia-northeast1",
];

const GCP_CLASSES: &[MachineClass] = &[
    MachineClass {
        name: "n2-standard-2",
        vcpus: 2,
        memory_bytes: 8 * GIB,
    },
    MachineClass {
        name: "n2-standard-4",
        vcpus: 4,
        memory_bytes: 16 * GIB,
    },
    MachineClass {
        name: "n2-standard-8",
        vcpus: 8,
        memory_bytes: 32 * GIB,
    },
    MachineClass {
        name: "c2-standard-16",
        vcpus: 16,
        memory_bytes: 64 * GIB,
    },
    MachineClass {
        name: "e2-highmem-4",
        vcpus: 4,
        memory_bytes: 32 * GIB,
    },
];

const AZURE_REGIONS: &[&str] = &[
    "eastus",
    "westus2",
    "westeurope",
    "northeurope",
    "southeastasia",
];

const AZURE_CLASSES: &[MachineClass] = &[
    MachineClass {
        name: "Standard_D2s_v3",
        vcpus: 2,
        memory_bytes: 8 * GIB,
    },
    MachineClass {
        name: "Standard_D4s_v3",
        vcpus: 4,
        memory_bytes: 16 * GIB,
    },
    MachineClass {
        name: "Standard_F8s_v2",
        vcpus: 8,
        memory_bytes: 16 * GIB,
    },
    MachineClass {
        name: "Standard_E4s_v3",
        vcpus: 4,
        memory_bytes: 32 * GIB,
    },
    MachineClass {
        name: "Standard_D16s_v3",
        vcpus: 16,
        memory_bytes: 64 * GIB,
    },
];

/// Regions available for a provider.
pub fn regions_for(provider: CloudProvider) -> &'static [&'static str] {
    match provider {
        CloudProvider::Aws => AWS_REGIONS,
        CloudProvider::Gcp => GCP_REGIONS,
        CloudProvider::Azure => AZURE_REGIONS,
    }
}

/// Machine classes available for a provider.
pub fn classes_for(provider: CloudProvider) -> &'static [MachineClass] {
    match provider {
        CloudProvider::Aws => AWS_CLASSES,
        CloudProvider::Gcp => GCP_CLASSES,
        CloudProvider::Azure => AZURE_CLASSES,
    }
}

/// Looks up a class by name within a provider, falling back to
/// [`FALLBACK_CLASS`] when the name is unknown.
pub fn class_by_name(provider: CloudProvider, name: &str) -> &'static MachineClass {
    classes_for(provider)
        .iter()
        .find(|c| c.name == name)
        .unwrap_or(&FALLBACK_CLASS)
}

/// Operating systems an entity can report.
pub const OS_NAMES: &[&str] = &[
    "Ubuntu 22.04.4 LTS",
    "Ubuntu 24.04.1 LTS",
    "Debian GNU/Linux 12",
    "Amazon Linux 2023",
];

/// Disk sizes an entity can be provisioned with.
pub const DISK_SIZES_BYTES: &[u64] = &[64 * GIB, 128 * GIB, 256 * GIB, 512 * GIB, 1024 * GIB];

/// Sensor kinds attached to an environmental station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Thermometer,
    Hygrometer,
    Anemometer,
    RainGauge,
    Pyranometer,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Thermometer => "thermometer",
            SensorKind::Hygrometer => "hygrometer",
            SensorKind::Anemometer => "anemometer",
            SensorKind::RainGauge => "rain_gauge",
            SensorKind::Pyranometer => "pyranometer",
        }
    }

    /// Sensors every station carries.
    pub fn base_set() -> &'static [SensorKind] {
        &[
            SensorKind::Thermometer,
            SensorKind::Hygrometer,
            SensorKind::Anemometer,
        ]
    }

    /// Sensors a station may optionally carry.
    pub fn optional_set() -> &'static [SensorKind] {
        &[SensorKind::RainGauge, SensorKind::Pyranometer]
    }
}

/// One sensor mounted on a station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSpec {
    pub kind: SensorKind,
    pub mount_height_m: f64,
}

/// Peak wattages solar panels ship in.
pub const PANEL_WATTS_PEAK: &[f64] = &[320.0, 380.0, 410.0, 450.0];

/// One solar panel attached to a station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelSpec {
    pub watts_peak: f64,
    pub tilt_deg: f64,
    pub azimuth_deg: f64,
    /// System derate covering wiring, inverter, and soiling losses.
    pub derate: f64,
}
