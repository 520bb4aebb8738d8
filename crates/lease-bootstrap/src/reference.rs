//! The reference first-boot plan for a dedicated game server.
//!
//! Order is load-bearing: package repositories, then architecture and
//! package-manager setup, then the workload binary, then the storage
//! client, then daemon installers, then activation. Each group depends on
//! state left by the one before it (32-bit libraries need the i386
//! architecture, installer retrieval needs the storage client).

use lease_core::{LeaseDescriptor, ProvisioningError};

use crate::error::BootstrapResult;
use crate::step::{BootstrapPlan, BootstrapStep, StepAction};

const STORAGE_CLI: &str = "/usr/local/bin/aws";
const STORAGE_CLI_BUNDLE: &str = "https://awscli.amazonaws.com/awscli-exe-linux-x86_64.zip";

/// An installer script kept in durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptAsset {
    /// Service unit the installer registers, without the `.service` suffix.
    pub unit: String,
    /// Bucket holding the script. Empty means the lease's own bucket.
    pub bucket: String,
    pub key: String,
}

impl ScriptAsset {
    pub fn new(unit: &str, key: &str) -> Self {
        Self {
            unit: unit.to_string(),
            bucket: String::new(),
            key: key.to_string(),
        }
    }

    fn local_path(&self) -> String {
        format!("/tmp/{}.service.sh", self.unit)
    }
}

/// Parameters of the reference plan, with explicit defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceParams {
    /// Unprivileged account that owns the workload.
    pub workload_user: String,
    pub workload_home: String,
    pub install_dir: String,
    /// Package-manager app id of the dedicated server.
    pub app_id: u32,
    pub storage_cli_bundle_url: String,
    /// Installers, registered and started in this order.
    pub assets: Vec<ScriptAsset>,
}

impl Default for ReferenceParams {
    fn default() -> Self {
        Self {
            workload_user: "ubuntu".to_string(),
            workload_home: "/home/steam".to_string(),
            install_dir: "/home/ubuntu/satisfactory".to_string(),
            app_id: 1690800,
            storage_cli_bundle_url: STORAGE_CLI_BUNDLE.to_string(),
            assets: vec![
                ScriptAsset::new("satisfactory", "scripts/satisfactory.service.sh"),
                ScriptAsset::new("lease-sync", "scripts/lease-sync.service.sh"),
                ScriptAsset::new("lease-idle", "scripts/lease-idle.service.sh"),
            ],
        }
    }
}

/// Build the reference plan for `descriptor`.
///
/// Only the bucket name is taken from the descriptor; everything else
/// comes from `params`.
pub fn reference_plan(
    descriptor: &LeaseDescriptor,
    params: &ReferenceParams,
) -> BootstrapResult<BootstrapPlan> {
    descriptor.validate()?;
    let lease_bucket = descriptor.bucket().ok_or_else(|| {
        ProvisioningError::Invalid(format!(
            "durable storage target '{}' has no bucket",
            descriptor.durable_storage_target
        ))
    })?;

    let mut builder = BootstrapPlan::builder()
        // Account and package repositories.
        .step(
            BootstrapStep::shell(
                "create-workload-home",
                format!("mkdir -p {}", params.workload_home),
            )
            .skip_if(StepAction::shell(format!("test -d {}", params.workload_home))),
        )
        .step(
            BootstrapStep::shell(
                "install-software-properties",
                "DEBIAN_FRONTEND=noninteractive apt-get install -y software-properties-common",
            )
            .skip_if(dpkg_installed("software-properties-common")),
        )
        .step(
            BootstrapStep::shell("enable-multiverse", "add-apt-repository -y multiverse")
                .idempotent()
                .after("install-software-properties"),
        )
        // Architecture and package manager.
        .step(
            BootstrapStep::new(
                "add-i386-architecture",
                StepAction::exec("dpkg", ["--add-architecture", "i386"]),
            )
            .skip_if(StepAction::shell(
                "dpkg --print-foreign-architectures | grep -qx i386",
            )),
        )
        .step(
            BootstrapStep::new("refresh-package-index", StepAction::exec("apt-get", ["update"]))
                .idempotent()
                .after("enable-multiverse")
                .after("add-i386-architecture"),
        )
        .step(
            BootstrapStep::shell(
                "install-steamcmd",
                "echo steam steam/question select 'I AGREE' | debconf-set-selections && \
                 DEBIAN_FRONTEND=noninteractive apt-get install -y lib32gcc1 steamcmd",
            )
            .skip_if(dpkg_installed("steamcmd"))
            .after("refresh-package-index"),
        )
        // Workload binary, through the opaque package-fetch command.
        .step(
            BootstrapStep::shell(
                "install-workload",
                format!(
                    "su - {user} -c '/usr/games/steamcmd +force_install_dir {dir} \
                     +login anonymous +app_update {app} validate +quit'",
                    user = params.workload_user,
                    dir = params.install_dir,
                    app = params.app_id,
                ),
            )
            .idempotent()
            .after("install-steamcmd"),
        )
        // Durable-storage client.
        .step(
            BootstrapStep::shell(
                "install-unzip",
                "DEBIAN_FRONTEND=noninteractive apt-get install -y unzip",
            )
            .skip_if(dpkg_installed("unzip"))
            .after("refresh-package-index"),
        )
        .step(
            BootstrapStep::shell(
                "install-storage-client",
                format!(
                    "cd /tmp && curl -fsSL '{url}' -o awscliv2.zip && \
                     unzip -oq awscliv2.zip && ./aws/install --update",
                    url = params.storage_cli_bundle_url,
                ),
            )
            .skip_if(StepAction::shell(format!("test -x {STORAGE_CLI}")))
            .after("install-unzip"),
        );

    // Daemon installers: retrieve, make executable, run.
    for asset in &params.assets {
        let bucket = if asset.bucket.is_empty() {
            lease_bucket
        } else {
            asset.bucket.as_str()
        };
        let local = asset.local_path();
        let fetch = format!("fetch-{}-installer", asset.unit);
        let chmod = format!("chmod-{}-installer", asset.unit);
        let install = format!("register-{}", asset.unit);

        builder = builder
            .step(
                BootstrapStep::new(
                    fetch.clone(),
                    StepAction::exec(
                        STORAGE_CLI,
                        [
                            "s3".to_string(),
                            "cp".to_string(),
                            format!("s3://{bucket}/{}", asset.key),
                            local.clone(),
                        ],
                    ),
                )
                .idempotent()
                .after("install-storage-client"),
            )
            .step(
                BootstrapStep::new(chmod.clone(), StepAction::exec("chmod", ["+x", local.as_str()]))
                    .idempotent()
                    .after(fetch),
            )
            .step(
                BootstrapStep::new(install, StepAction::exec(local.clone(), Vec::<String>::new()))
                    .after(chmod),
            );
    }

    // Activation: enable = start on boot, start = start now.
    for asset in &params.assets {
        let unit = format!("{}.service", asset.unit);
        let enable = format!("enable-{}", asset.unit);
        builder = builder
            .step(
                BootstrapStep::new(
                    enable.clone(),
                    StepAction::exec("systemctl", ["enable", unit.as_str()]),
                )
                .skip_if(StepAction::exec(
                    "systemctl",
                    ["is-enabled", "--quiet", unit.as_str()],
                ))
                .after(format!("register-{}", asset.unit)),
            )
            .step(
                BootstrapStep::new(
                    format!("start-{}", asset.unit),
                    StepAction::exec("systemctl", ["start", unit.as_str()]),
                )
                .skip_if(StepAction::exec("systemctl", ["is-active", "--quiet", unit.as_str()]))
                .after(enable),
            );
    }

    builder.build()
}

fn dpkg_installed(package: &str) -> StepAction {
    StepAction::exec("dpkg", ["-s", package])
}
