//! Known containerd builds
//!
//! When adding a version, copy the previous one, replace the version in the
//! URLs, and update the hashes from the published artifacts.

use artifacts::{Architecture, ArtifactRecord, Catalog, Distribution};

const NAME: &str = "containerd.io";

const DOCKER_DEBIAN: &str = "https://download.docker.com/linux/debian/dists";
const DOCKER_UBUNTU: &str = "https://download.docker.com/linux/ubuntu/dists";
const DOCKER_CENTOS: &str = "https://download.docker.com/linux/centos";
const CRI_RELEASE: &str = "https://storage.googleapis.com/cri-containerd-release";

fn deb(
    version: &str,
    concrete: &str,
    dists: &str,
    codename: &str,
    distribution: Distribution,
    hash: &str,
) -> ArtifactRecord {
    let source =
        format!("{dists}/{codename}/pool/stable/amd64/containerd.io_{concrete}_amd64.deb");
    ArtifactRecord::package(NAME, version, concrete, source, hash)
        .for_distributions(&[distribution])
        .for_architectures(&[Architecture::Amd64])
}

fn tarball(version: &str, hash: &str) -> ArtifactRecord {
    let source = format!("{CRI_RELEASE}/cri-containerd-{version}.linux-amd64.tar.gz");
    ArtifactRecord::archive(NAME, version, source, hash).for_architectures(&[Architecture::Amd64])
}

/// The full containerd table
pub fn containerd_catalog() -> Catalog {
    let el7_rpm = format!(
        "{DOCKER_CENTOS}/7/x86_64/stable/Packages/containerd.io-1.2.10-3.2.el7.x86_64.rpm"
    );
    let el7_hash = "f6447e84479df3a58ce04a3da87ccc384663493b";

    Catalog::new(vec![
        // 1.2.4 - Debian Stretch
        deb(
            "1.2.4",
            "1.2.4-1",
            DOCKER_DEBIAN,
            "stretch",
            Distribution::Debian9,
            "48c6ab0c908316af9a183de5aad64703bc516bdf",
        ),
        // 1.2.10 - Debian Stretch
        deb(
            "1.2.10",
            "1.2.10-3",
            DOCKER_DEBIAN,
            "stretch",
            Distribution::Debian9,
            "186f2f2c570f37b363102e6b879073db6dec671d",
        ),
        // 1.2.10 - Debian Buster
        deb(
            "1.2.10",
            "1.2.10-3",
            DOCKER_DEBIAN,
            "buster",
            Distribution::Debian10,
            "365e4a7541ce2cf3c3036ea2a9bf6b40a50893a8",
        ),
        // 1.2.10 - Ubuntu Xenial
        deb(
            "1.2.10",
            "1.2.10-3",
            DOCKER_UBUNTU,
            "xenial",
            Distribution::Xenial,
            "b64e7170d9176bc38967b2e12147c69b65bdd0fc",
        ),
        // 1.2.10 - Ubuntu Bionic
        deb(
            "1.2.10",
            "1.2.10-3",
            DOCKER_UBUNTU,
            "bionic",
            Distribution::Bionic,
            "f4c941807310e3fa470dddfb068d599174a3daec",
        ),
        // 1.2.10 - CentOS / RHEL 7
        ArtifactRecord::package(NAME, "1.2.10", "1.2.10", el7_rpm.clone(), el7_hash)
            .for_distributions(&[Distribution::Rhel7, Distribution::Centos7])
            .for_architectures(&[Architecture::Amd64]),
        // 1.2.10 - CentOS / RHEL 8, same el7 build
        ArtifactRecord::package(NAME, "1.2.10", "1.2.10", el7_rpm, el7_hash)
            .for_distributions(&[Distribution::Rhel8, Distribution::Centos8])
            .for_architectures(&[Architecture::Amd64]),
        // 1.2.10 - Amazon Linux 2 and Focal have no repository build
        tarball("1.2.10", "c84c29dcd1867a6ee9899d2106ab4f28854945f6")
            .for_distributions(&[Distribution::AmazonLinux2, Distribution::Focal]),
        // Generic binaries for everything else
        tarball("1.2.11", "c98c9fdfd0984557e5b1a1f209213d2d8ad8471c"),
        tarball("1.2.12", "9455ca2508ad57438cb02a986ba763033bcb05f7"),
        tarball("1.2.13", "70ee2821e26116b0cddc679d14806fd20d25d65c"),
        tarball("1.3.2", "f451d46280104588f236bee277bca1da8babc0e8"),
        tarball("1.3.3", "921b74e84da366ec3eaa72ff97fa8d6ae56834c6"),
        tarball("1.3.4", "ce518d8091ffdd40caa7f386c742d9b1d03e01b5"),
    ])
}
