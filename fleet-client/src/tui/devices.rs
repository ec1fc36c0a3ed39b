use chrono::{DateTime, Utc};

use fleet_shared::{application::Application, device::Device};

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

fn status_badge(online: Option<bool>) -> String {
    match online {
        Some(true) => green("online"),
        Some(false) => red("offline"),
        None => dim("-"),
    }
}

fn visible_len(s: &str) -> usize {
    // strip ANSI CSI sequences: \x1b[ ... m
    let mut n = 0usize;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
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
        format!("{}{}", s, " ".repeat(width - vis))
    }
}

fn row(cells: &[(&str, usize)], tail: &str) -> String {
    let mut out = cells
        .iter()
        .map(|(cell, width)| pad_cell(cell, *width))
        .collect::<Vec<_>>()
        .join(" ");
    out.push(' ');
    out.push_str(tail);
    out
}

pub fn print_devices_table(devices: &[Device]) {
    if devices.is_empty() {
        println!("{}", dim("No devices found"));
        return;
    }

    const WIDTH_UUID: usize = 8;
    const WIDTH_NAME: usize = 20;
    const WIDTH_STATUS: usize = 8;
    const WIDTH_OS: usize = 22;
    const WIDTH_IP: usize = 16;

    println!("{}", bold("Devices"));
    println!(
        "  {}",
        row(
            &[
                (dim("UUID").as_str(), WIDTH_UUID),
                (dim("NAME").as_str(), WIDTH_NAME),
                (dim("STATUS").as_str(), WIDTH_STATUS),
                (dim("OS").as_str(), WIDTH_OS),
                (dim("IP").as_str(), WIDTH_IP),
            ],
            &dim("LAST SEEN"),
        )
    );

    for dev in devices {
        let name = truncate_str(dev.device_name.as_deref().unwrap_or("-"), WIDTH_NAME - 1);
        let os = truncate_str(dev.os_version.as_deref().unwrap_or("-"), WIDTH_OS - 1);
        let ip = dev.ip_address.as_deref().unwrap_or("-");
        let last_seen = dev
            .last_connectivity_event
            .map(format_relative_time)
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {}",
            row(
                &[
                    (dev.short_uuid(), WIDTH_UUID),
                    (name.as_str(), WIDTH_NAME),
                    (status_badge(dev.is_online).as_str(), WIDTH_STATUS),
                    (os.as_str(), WIDTH_OS),
                    (ip, WIDTH_IP),
                ],
                &last_seen,
            )
        );
    }
}

pub fn print_applications_table(apps: &[Application]) {
    if apps.is_empty() {
        println!("{}", dim("No applications found"));
        return;
    }

    const WIDTH_ID: usize = 8;
    const WIDTH_NAME: usize = 24;

    println!("{}", bold("Applications"));
    println!(
        "  {}",
        row(
            &[(dim("ID").as_str(), WIDTH_ID), (dim("NAME").as_str(), WIDTH_NAME)],
            &dim("DEVICE TYPE"),
        )
    );
    for app in apps {
        let id = app.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {}",
            row(
                &[
                    (id.as_str(), WIDTH_ID),
                    (truncate_str(app.display_name(), WIDTH_NAME - 1).as_str(), WIDTH_NAME),
                ],
                app.device_type.as_deref().unwrap_or("-"),
            )
        );
    }
}

pub fn print_device_info(device: &Device, application: Option<&Application>) {
    println!(
        "{} {}",
        "Device",
        bold(device.device_name.as_deref().unwrap_or("-"))
    );
    for (label, value) in device_info_lines(device, application) {
        println!("  {} {}", pad_cell(&dim(label), 14), value);
    }
}

fn device_info_lines(
    device: &Device,
    application: Option<&Application>,
) -> Vec<(&'static str, String)> {
    let or_dash = |v: Option<&str>| v.unwrap_or("-").to_string();
    vec![
        ("ID", device.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into())),
        ("UUID", or_dash(device.uuid.as_deref())),
        ("STATUS", or_dash(device.status.as_deref())),
        ("ONLINE", status_badge(device.is_online)),
        ("OS", or_dash(device.os_version.as_deref())),
        ("IP", or_dash(device.ip_address.as_deref())),
        (
            "LAST SEEN",
            device
                .last_connectivity_event
                .map(format_relative_time)
                .unwrap_or_else(|| "-".to_string()),
        ),
        (
            "APPLICATION",
            application
                .map(|app| app.display_name().to_string())
                .unwrap_or_else(|| "N/a".to_string()),
        ),
    ]
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max - 3).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Format a timestamp as relative time (e.g., "2 min ago", "3 days ago")
fn format_relative_time(time: DateTime<Utc>) -> String {
    format_relative_to(time, Utc::now())
}

fn format_relative_to(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(time);

    let secs = duration.num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    if secs < 60 {
        return format!("{} sec ago", secs);
    }

    let mins = duration.num_minutes();
    if mins < 60 {
        return format!("{} min ago", mins);
    }

    let hours = duration.num_hours();
    if hours < 24 {
        return format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" });
    }

    let days = duration.num_days();
    if days < 30 {
        return format!("{} day{} ago", days, if days == 1 { "" } else { "s" });
    }

    let months = days / 30;
    if months < 12 {
        return format!("{} month{} ago", months, if months == 1 { "" } else { "s" });
    }

    let years = days / 365;
    format!("{} year{} ago", years, if years == 1 { "" } else { "s" })
}
