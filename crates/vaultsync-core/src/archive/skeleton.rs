//! Fixed entries every package carries.

/// `(zip path, content)`; `None` content marks a directory entry.
pub type SkeletonEntry = (&'static str, Option<&'static [u8]>);

pub const SKELETON: &[SkeletonEntry] = &[
    ("META-INF/", None),
    ("META-INF/vault/", None),
    (
        "META-INF/vault/config.xml",
        Some(include_bytes!("../../data/package-content/META-INF/vault/config.xml")),
    ),
    ("META-INF/vault/definition/", None),
    (
        "META-INF/vault/definition/.content.xml",
        Some(include_bytes!(
            "../../data/package-content/META-INF/vault/definition/.content.xml"
        )),
    ),
    (
        "META-INF/vault/nodetypes.cnd",
        Some(include_bytes!("../../data/package-content/META-INF/vault/nodetypes.cnd")),
    ),
    (
        "META-INF/vault/properties.xml",
        Some(include_bytes!("../../data/package-content/META-INF/vault/properties.xml")),
    ),
    ("jcr_root/", None),
    (
        "jcr_root/vaultsync.txt",
        Some(include_bytes!("../../data/package-content/jcr_root/vaultsync.txt")),
    ),
];

/// `.content.xml` body for a directory that has none on disk.
pub const NT_FOLDER: &[u8] = include_bytes!("../../data/nt-folder/.content.xml");
