//! Formatted output helpers for CLI commands.

use std::fmt::Write as _;

use vifbind_common::types::{BindingContext, Vif, VifKind};

/// One-line description of a binding, used in results and error context.
#[must_use]
pub fn binding_summary(vif: &Vif, ctx: &BindingContext) -> String {
    let netns = ctx
        .netns
        .as_ref()
        .map_or_else(|| "current namespace".to_string(), |p| p.display().to_string());
    format!("{} VIF {} as {} in {netns}", vif.kind, vif.id, ctx.ifname)
}

/// Renders VIF kinds one per line, each followed by its binding method.
#[must_use]
pub fn kind_table<'a>(kinds: impl Iterator<Item = &'a VifKind>) -> String {
    let mut out = format!("{:<20} {}\n", "KIND", "BINDING");
    for kind in kinds {
        let binding = match kind {
            VifKind::Bridge => "veth + linux bridge",
            VifKind::OpenVSwitch => "veth + ovs port",
            _ => "custom",
        };
        let _ = writeln!(out, "{:<20} {binding}", kind.as_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vif() -> Vif {
        serde_json::from_str(r#"{"kind": "VIFBridge", "id": "port-1"}"#).unwrap()
    }

    #[test]
    fn summary_names_current_namespace() {
        let summary = binding_summary(&vif(), &BindingContext::new("eth0"));
        assert_eq!(summary, "VIFBridge VIF port-1 as eth0 in current namespace");
    }

    #[test]
    fn summary_names_namespace_path() {
        let ctx = BindingContext::new("eth1").netns("/var/run/netns/c1");
        assert!(binding_summary(&vif(), &ctx).ends_with("in /var/run/netns/c1"));
    }

    #[test]
    fn kind_table_lists_each_kind() {
        let kinds = [VifKind::Bridge, VifKind::OpenVSwitch];
        let table = kind_table(kinds.iter());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("VIFBridge"));
        assert!(lines[2].ends_with("veth + ovs port"));
    }
}
