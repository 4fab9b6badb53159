//! Pure text transforms applied to a fetched `/connect` config body (§4.6
//! "Content negotiation").

/// Splices `PrivateKey = <base64>` directly under `[Interface]`, matching
/// the line eduvpn-style WireGuard configs expect (§4.6 "splices
/// `PrivateKey = <base64>` under the `[Interface]` section").
pub fn splice_wireguard_private_key(config: &str, private_key_base64: &str) -> String {
    let mut out = String::with_capacity(config.len() + private_key_base64.len() + 32);
    for line in config.lines() {
        out.push_str(line);
        out.push('\n');
        if line.trim() == "[Interface]" {
            out.push_str("PrivateKey = ");
            out.push_str(private_key_base64);
            out.push('\n');
        }
    }
    out
}

/// §4.6 "on OpenVPN, `script-security 0` is appended by default".
pub fn append_openvpn_script_security(config: &str) -> String {
    let mut out = config.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("script-security 0\n");
    out
}

/// §4.6 "If `prefer_tcp=true` the config's `remote` lines are reordered so
/// TCP entries appear first." Stable within each group; untouched if fewer
/// than two `remote` lines are present.
pub fn reorder_remotes_tcp_first(config: &str) -> String {
    let mut lines: Vec<&str> = config.lines().collect();
    let remote_indices: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_start().starts_with("remote "))
        .map(|(i, _)| i)
        .collect();

    if remote_indices.len() < 2 {
        return config.to_string();
    }

    let mut remotes: Vec<&str> = remote_indices.iter().map(|&i| lines[i]).collect();
    remotes.sort_by_key(|line| !line.to_ascii_lowercase().contains("tcp"));

    for (slot, idx) in remote_indices.iter().enumerate() {
        lines[*idx] = remotes[slot];
    }

    let mut out = lines.join("\n");
    if config.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splices_private_key_under_interface_section() {
        let config = "[Interface]\nAddress = 10.43.43.2/24\n\n[Peer]\nPublicKey = abc\n";
        let spliced = splice_wireguard_private_key(config, "KEY==");
        assert!(spliced.contains("[Interface]\nPrivateKey = KEY==\nAddress = 10.43.43.2/24"));
    }

    #[test]
    fn appends_script_security_once() {
        let config = "client\ndev tun\n";
        let out = append_openvpn_script_security(config);
        assert!(out.ends_with("script-security 0\n"));
    }

    #[test]
    fn reorders_tcp_remotes_first() {
        let config = "client\nremote udp.example.org 1194 udp\nremote tcp.example.org 443 tcp\nkeepalive 10 60\n";
        let out = reorder_remotes_tcp_first(config);
        let remote_lines: Vec<&str> = out.lines().filter(|l| l.starts_with("remote ")).collect();
        assert_eq!(remote_lines, vec!["remote tcp.example.org 443 tcp", "remote udp.example.org 1194 udp"]);
    }

    #[test]
    fn single_remote_line_is_left_untouched() {
        let config = "client\nremote vpn.example.org 1194 udp\n";
        assert_eq!(reorder_remotes_tcp_first(config), config);
    }

    #[test]
    fn multiple_tcp_entries_keep_relative_order() {
        let config = "remote a.example.org 443 tcp\nremote b.example.org 1194 udp\nremote c.example.org 443 tcp\n";
        let out = reorder_remotes_tcp_first(config);
        let remote_lines: Vec<&str> = out.lines().filter(|l| l.starts_with("remote ")).collect();
        assert_eq!(
            remote_lines,
            vec!["remote a.example.org 443 tcp", "remote c.example.org 443 tcp", "remote b.example.org 1194 udp"]
        );
    }
}
