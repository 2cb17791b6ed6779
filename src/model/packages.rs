//! Base OS packages every node needs, plus any extras from the config

use super::NodeModel;
use crate::tasks::{Package, PackageManager};
use anyhow::Result;
use converge::{Emitter, ModelBuilder};

const APT_PACKAGES: &[&str] = &["conntrack", "ebtables", "ethtool", "iptables", "socat"];
const YUM_PACKAGES: &[&str] = &["conntrack-tools", "ebtables", "ethtool", "iptables", "socat"];

#[derive(Debug, Default)]
pub struct PackagesBuilder;

impl PackagesBuilder {
    fn base(manager: PackageManager) -> &'static [&'static str] {
        match manager {
            PackageManager::Apt => APT_PACKAGES,
            PackageManager::Yum => YUM_PACKAGES,
        }
    }
}

impl ModelBuilder<NodeModel> for PackagesBuilder {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn build(&self, model: &NodeModel, out: &mut Emitter) -> Result<()> {
        let Some(manager) = model.package_manager() else {
            if !model.config.packages.extra.is_empty() {
                log::warn!(
                    "{} has no package manager, ignoring extra packages",
                    model.distribution
                );
            }
            return Ok(());
        };

        let extra = model.config.packages.extra.iter().map(String::as_str);
        for name in Self::base(manager).iter().copied().chain(extra) {
            out.add(Package::os(name, manager));
        }
        Ok(())
    }
}
