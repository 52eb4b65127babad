use fleetos_shared::{device::Device, os::OsVersion};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

fn dim(s: &str) -> String {
    format!("{DIM}{s}{RESET}")
}
fn green(s: &str) -> String {
    format!("{GREEN}{s}{RESET}")
}
fn red(s: &str) -> String {
    format!("{RED}{s}{RESET}")
}
fn bold(s: &str) -> String {
    format!("{BOLD}{s}{RESET}")
}

fn status_badge(online: bool) -> String {
    if online {
        green("online")
    } else {
        red("offline")
    }
}

fn visible_len(s: &str) -> usize {
    // strip ANSI CSI sequences: \x1b[ ... m
    let mut n = 0usize;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next(); // '['
            for x in chars.by_ref() {
                if x == 'm' {
                    break;
                }
            }
            continue;
        }
        n += 1;
    }
    n
}

fn pad_cell(s: &str, width: usize) -> String {
    let vis = visible_len(s);
    if vis >= width {
        s.to_string()
    } else {
        let mut out = String::with_capacity(s.len() + (width - vis));
        out.push_str(s);
        out.extend(std::iter::repeat_n(' ', width - vis));
        out
    }
}

/// One line per version, the recommended ones highlighted.
pub fn os_version_lines(versions: &[OsVersion]) -> Vec<String> {
    versions
        .iter()
        .map(|v| {
            if v.is_recommended {
                bold(&v.formatted_version)
            } else {
                v.formatted_version.clone()
            }
        })
        .collect()
}

pub fn print_os_versions(device_type: &str, esr: bool, versions: &[OsVersion]) {
    let track = if esr { "ESR versions" } else { "Versions" };
    println!("{} {}", bold(track), dim(&format!("for {device_type}")));
    for line in os_version_lines(versions) {
        println!("  {line}");
    }
}

/// Key/value block for a device and its services, given as `(name, status)`.
pub fn device_lines(device: &Device, services: &[(String, Option<String>)]) -> Vec<String> {
    const WIDTH_KEY: usize = 14;
    const WIDTH_SERVICE: usize = 24;

    let row = |key: &str, value: &str| format!("{} {}", pad_cell(&dim(key), WIDTH_KEY), value);
    let mut lines = vec![
        bold(&device.device_name),
        row("UUID", &device.uuid),
        row("DEVICE TYPE", &device.device_type),
        row("STATUS", &status_badge(device.is_online)),
        row("OS VERSION", device.os_version.as_deref().unwrap_or("-")),
        row("IP ADDRESS", device.ip_address.as_deref().unwrap_or("-")),
        row(
            "LAST SEEN",
            device.last_connectivity_event.as_deref().unwrap_or("-"),
        ),
    ];

    if services.is_empty() {
        lines.push(row("SERVICES", &dim("none")));
    } else {
        lines.push(dim("SERVICES"));
        for (name, status) in services {
            lines.push(format!(
                "  {} {}",
                pad_cell(name, WIDTH_SERVICE),
                status.as_deref().unwrap_or("-")
            ));
        }
    }
    lines
}

pub fn print_device(device: &Device, services: &[(String, Option<String>)]) {
    for line in device_lines(device, services) {
        println!("{line}");
    }
}
