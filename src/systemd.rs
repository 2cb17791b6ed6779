//! systemd unit manifests

use std::fmt::Write as _;

/// Directory unit files are written to
pub const UNIT_DIR: &str = "/etc/systemd/system";

/// A sectioned unit file with ordered, repeatable keys
///
/// Sections render in the order they were first touched; keys within a
/// section keep insertion order, and setting a key twice keeps both lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value` to `section`
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = (key.to_string(), value.to_string());
        match self.sections.iter_mut().find(|s| s.name == section) {
            Some(s) => s.entries.push(entry),
            None => self.sections.push(Section {
                name: section.to_string(),
                entries: vec![entry],
            }),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.entries {
                let _ = writeln!(out, "{key}={value}");
            }
        }
        out
    }
}

/// Path of a unit file
pub fn unit_path(unit: &str) -> String {
    format!("{UNIT_DIR}/{unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_section_and_key_order() {
        let mut m = Manifest::new();
        m.set("Unit", "Description", "containerd container runtime");
        m.set("Service", "EnvironmentFile", "/etc/sysconfig/containerd");
        m.set("Unit", "After", "network.target");
        m.set("Service", "EnvironmentFile", "/etc/environment");
        m.set("Install", "WantedBy", "multi-user.target");

        assert_eq!(
            m.render(),
            "[Unit]\n\
             Description=containerd container runtime\n\
             After=network.target\n\
             \n\
             [Service]\n\
             EnvironmentFile=/etc/sysconfig/containerd\n\
             EnvironmentFile=/etc/environment\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n"
        );
    }

    #[test]
    fn test_empty_manifest() {
        assert_eq!(Manifest::new().render(), "");
        assert_eq!(unit_path("containerd.service"), "/etc/systemd/system/containerd.service");
    }
}
