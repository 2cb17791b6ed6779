//! containerd runtime builder
//!
//! Installs containerd from the catalog, writes its configuration and
//! sysconfig, and manages `containerd.service`. Image-based distributions
//! ship containerd already, so there only a unit drop-in is written.

use super::NodeModel;
use crate::flags::containerd_flags;
use crate::systemd::Manifest;
use crate::tasks::{Archive, Chattr, File, Package, PackageManager, Service, archive, package};
use anyhow::{Context, Result, bail};
use artifacts::{ArtifactRecord, InstallMechanism, PostInstallAction};
use converge::{Emitter, ModelBuilder, TaskId};

const LICENSE_PATH: &str = "/usr/share/doc/containerd/apache.txt";
const LICENSE: &str = include_str!("resources/containerd-apache2.txt");

pub const CONFIG_PATH: &str = "/etc/containerd/config-nodeup.toml";
pub const SYSCONFIG_PATH: &str = "/etc/sysconfig/containerd";
pub const DROP_IN_PATH: &str = "/etc/systemd/system/containerd.service.d/10-nodeup.conf";
pub const CNI_TEMPLATE_PATH: &str = "/etc/containerd/cni-config.template";
pub const SERVICE: &str = "containerd.service";

/// Subpaths of the release tarball and where they are installed
const ARCHIVE_MAP: [(&str, &str); 2] = [("./usr/local/bin", "/usr"), ("./usr/local/sbin", "/usr")];

#[derive(Debug, Default)]
pub struct ContainerdBuilder;

impl ModelBuilder<NodeModel> for ContainerdBuilder {
    fn name(&self) -> &'static str {
        "containerd"
    }

    fn build(&self, model: &NodeModel, out: &mut Emitter) -> Result<()> {
        let config = model.config.cluster.containerd();
        if config.skip_install {
            log::info!("skipInstall is set; won't install containerd");
            return Ok(());
        }

        if model.distribution.is_immutable_image() {
            log::info!("Detected {}; won't install containerd", model.distribution);
            out.add(drop_in());
            out.add(sysconfig(model)?);
            return Ok(());
        }

        out.add(File::new(LICENSE_PATH, LICENSE));
        out.add(File::new(
            CONFIG_PATH,
            config.config_override.clone().unwrap_or_default(),
        ));

        let version = config
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .context("error finding containerd version")?;

        let selected = model
            .catalog
            .select(model.distribution, model.architecture, version);
        if selected.is_empty() {
            log::warn!(
                "Did not find containerd package for {} {} {}",
                model.distribution,
                model.architecture,
                version
            );
        }
        // Every match is installed: some distributions need several artifacts
        for record in selected {
            install(model, record, out)?;
        }

        out.add(service());
        out.add(sysconfig(model)?);

        if model.config.cluster.container_runtime == "containerd"
            && model.config.cluster.uses_kubenet()
        {
            out.add(kubenet_cni_template());
        }

        Ok(())
    }
}

/// Emit the install task for one catalog record and its follow-ups
fn install(model: &NodeModel, record: &ArtifactRecord, out: &mut Emitter) -> Result<()> {
    let manager = model.package_manager();
    let install_id = match record.mechanism {
        InstallMechanism::PlainArchive => {
            let mut task = Archive::new(
                &record.name,
                &record.source,
                &record.hash,
                "/",
                model.store.clone(),
            );
            for (from, to) in ARCHIVE_MAP {
                task = task.map_file(from, to);
            }
            out.add(task);
            TaskId::new(archive::KIND, &record.name)
        }
        InstallMechanism::ManagedPackage => {
            let Some(manager) = manager else {
                bail!(
                    "{} {} is a package but {} has no package manager",
                    record.name,
                    record.version(),
                    model.distribution
                );
            };
            let mut task = Package::os(&record.name, manager)
                .with_version(record.version())
                .with_source(&record.source, &record.hash, model.store.clone())
                .preventing_start();
            for extra in &record.extra_packages {
                task = task.with_dep(
                    Package::os(&extra.name, manager)
                        .with_version(&extra.version)
                        .with_source(&extra.source, &extra.hash, model.store.clone())
                        .preventing_start(),
                );
            }
            out.add(task);
            TaskId::new(package::KIND, &record.name)
        }
    };

    for action in &record.post_install {
        match action {
            PostInstallAction::MarkImmutable { path } => {
                out.add(Chattr::new(path, "+i").after(install_id.clone()));
            }
        }
    }

    if !record.os_dependencies.is_empty() {
        let manager: PackageManager = manager.with_context(|| {
            format!("{} has no package manager for {}", model.distribution, record.name)
        })?;
        for dep in &record.os_dependencies {
            out.add(Package::os(dep, manager));
        }
    }
    Ok(())
}

/// The containerd unit, after the upstream cri unit
fn service() -> Service {
    let mut manifest = Manifest::new();
    manifest.set("Unit", "Description", "containerd container runtime");
    manifest.set("Unit", "Documentation", "https://containerd.io");
    manifest.set("Unit", "After", "network.target local-fs.target");

    manifest.set("Service", "EnvironmentFile", SYSCONFIG_PATH);
    manifest.set("Service", "EnvironmentFile", "/etc/environment");
    manifest.set("Service", "ExecStartPre", "-/sbin/modprobe overlay");
    manifest.set(
        "Service",
        "ExecStart",
        &format!("/usr/bin/containerd -c {CONFIG_PATH} \"$CONTAINERD_OPTS\""),
    );
    manifest.set("Service", "Restart", "always");
    manifest.set("Service", "RestartSec", "5");

    // systemd must not reset the cgroups of containers
    manifest.set("Service", "Delegate", "yes");
    manifest.set("Service", "KillMode", "process");
    manifest.set("Service", "OOMScoreAdjust", "-999");

    manifest.set("Service", "LimitNOFILE", "1048576");
    manifest.set("Service", "LimitNPROC", "infinity");
    manifest.set("Service", "LimitCORE", "infinity");
    manifest.set("Service", "TasksMax", "infinity");

    manifest.set("Install", "WantedBy", "multi-user.target");

    let rendered = manifest.render();
    log::trace!("Built service manifest {SERVICE}\n{rendered}");
    Service::new(SERVICE).with_definition(rendered)
}

/// Daemon options for a preinstalled containerd
fn drop_in() -> File {
    let env_file = format!("EnvironmentFile={SYSCONFIG_PATH}");
    let contents = [
        "[Service]",
        env_file.as_str(),
        "EnvironmentFile=/etc/environment",
        "TasksMax=infinity",
    ]
    .join("\n");

    File::new(DROP_IN_PATH, contents)
        .after_file(SYSCONFIG_PATH)
        .on_change(&["systemctl", "daemon-reload"])
        .on_change(&["systemctl", "restart", SERVICE])
        // nodeup itself is a oneshot unit; --no-block keeps this from waiting on it
        .on_change(&["systemctl", "restart", "--no-block", "nodeup.service"])
}

fn sysconfig(model: &NodeModel) -> Result<File> {
    let flags = containerd_flags(&model.config.cluster.containerd())
        .context("error building containerd flags")?;
    Ok(File::new(SYSCONFIG_PATH, format!("CONTAINERD_OPTS={flags}")))
}

/// CNI config for kubenet, rendered by containerd's cri plugin
fn kubenet_cni_template() -> File {
    let contents = [
        "{",
        "    \"cniVersion\": \"0.3.1\",",
        "    \"name\": \"kubenet\",",
        "    \"plugins\": [",
        "        {",
        "            \"type\": \"bridge\",",
        "            \"bridge\": \"cbr0\",",
        "            \"mtu\": 1460,",
        "            \"addIf\": \"eth0\",",
        "            \"isGateway\": true,",
        "            \"ipMasq\": true,",
        "            \"promiscMode\": true,",
        "            \"ipam\": {",
        "                \"type\": \"host-local\",",
        "                \"subnet\": \"{{.PodCIDR}}\",",
        "                \"routes\": [{ \"dst\": \"0.0.0.0/0\" }]",
        "            }",
        "        }",
        "    ]",
        "}",
    ]
    .join("\n");
    log::trace!("Built kubenet CNI config file\n{contents}");
    File::new(CNI_TEMPLATE_PATH, contents)
}
