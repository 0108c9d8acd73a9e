//! System-wide constants and default paths.

/// Default location of the binder configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/vifbind/vifbind.toml";

/// Drivers that run their own dataplane and never receive L3 configuration.
pub const USERSPACE_DRIVERS: &[&str] = &["vfio-pci", "uio", "uio_pci_generic", "igb_uio"];

/// Prefix of the `/proc` filesystem rewritten in container mode.
pub const PROC_PREFIX: &str = "/proc";

/// Network namespace of the calling thread.
pub const THREAD_NETNS_PATH: &str = "/proc/thread-self/ns/net";

/// Sysctl toggling IPv6 for every interface of the current namespace.
pub const DISABLE_IPV6_SYSCTL: &str = "/proc/sys/net/ipv6/conf/all/disable_ipv6";

/// Process status file carrying the effective capability mask.
pub const PROC_SELF_STATUS: &str = "/proc/self/status";

/// Destination name of the default route.
pub const DEFAULT_ROUTE: &str = "default";

/// Prefix of derived host-side device names.
pub const HOST_IFNAME_PREFIX: &str = "tap";

/// Maximum length of a derived host-side device name.
pub const HOST_IFNAME_MAX_LEN: usize = 14;

/// Binary name.
pub const APP_NAME: &str = "vifbind";
