//! `wget` — a long-running simulated HTTP fetch. Like `ping`, it streams
//! output over time and is driven directly by the shell through [`run`]
//! rather than through the synchronous [`super::Command`] registry.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use futures::StreamExt;
use tokio::sync::Mutex;

use super::help_or_version;
use crate::data;
use crate::host::VirtualHost;
use crate::terminal::Terminal;

struct Args {
    output_document: Option<String>,
    url: Option<String>,
}

fn parse(params: &[String]) -> Args {
    let mut output_document = None;
    let mut url = None;
    let mut iter = params.iter().peekable();
    while let Some(p) = iter.next() {
        if let Some(rest) = p.strip_prefix("--output-document=") {
            output_document = Some(rest.to_string());
        } else if p == "--output-document" || p == "-O" {
            if let Some(v) = iter.next() {
                output_document = Some(v.clone());
            }
        } else if !p.starts_with('-') && url.is_none() {
            url = Some(p.clone());
        }
    }
    Args { output_document, url }
}

/// Successive divisions by 1024 with units `K M G T P E Z`, with a
/// trailing `Yi` sentinel for the implausible last bracket, matching the
/// original implementation's humanizer.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Yi"];
    let mut size = bytes as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < UNITS.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{}", bytes)
    } else {
        format!("{:.1}{}", size, UNITS[idx])
    }
}

/// Average throughput since `start`, rendered the same way as byte counts
/// (`human_size`) with a trailing `/s`.
fn speed(got: u64, start: Instant) -> String {
    let bytes_per_sec = got as f64 / start.elapsed().as_secs_f64().max(0.1);
    format!("{}/s", human_size(bytes_per_sec as u64))
}

fn progress_bar(got: u64, total: u64) -> String {
    let pct = if total == 0 { 100 } else { ((got * 100) / total).min(100) };
    let filled = (pct as usize * 50) / 100;
    let bar: String = (0..50)
        .map(|i| if i < filled { '=' } else { ' ' })
        .collect();
    format!("{:>3}%[{}]", pct, bar)
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

async fn fail_path(sink: &mut dyn Terminal, url: &str, host_display: &str) -> anyhow::Result<()> {
    sink.write_line(&format!("--{}--  {}", timestamp(), url)).await?;
    sink.write_line(&format!(
        "Resolving {} ({})... failed: Name or service not known.",
        host_display, host_display
    ))
    .await?;
    sink.write_line(&format!(
        "wget: unable to resolve host address '{}'",
        host_display
    ))
    .await?;
    Ok(())
}

pub async fn run(
    params: &[String],
    host: &Arc<Mutex<VirtualHost>>,
    sink: &mut dyn Terminal,
) -> anyhow::Result<()> {
    if let Some(out) = help_or_version(params, &data::WGET) {
        sink.write_line(&out).await?;
        return Ok(());
    }

    let args = parse(params);
    let Some(url_str) = args.url else {
        sink.write_line("wget: missing URL").await?;
        sink.write_line("Usage: wget [OPTION]... [URL]...").await?;
        sink.write_line("Try `wget --help' for more options.").await?;
        return Ok(());
    };

    let parsed = reqwest::Url::parse(&url_str).ok();
    let scheme_ok = parsed
        .as_ref()
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false);

    let host_display = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or(&url_str)
        .to_string();

    if !scheme_ok {
        return fail_path(sink, &url_str, &host_display).await;
    }
    let url = parsed.unwrap();

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let head = client.get(url.clone()).send().await;
    let response = match head {
        Ok(resp) if resp.status().is_success() && resp.content_length().is_some() => resp,
        _ => {
            return fail_path(sink, &url_str, &host_display).await;
        }
    };

    let total: u64 = response.content_length().unwrap_or(0);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let port = url.port_or_known_default().unwrap_or(80);
    let ip_display = tokio::net::lookup_host((host_display.as_str(), port))
        .await
        .ok()
        .and_then(|mut it| it.next())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let outfile = args.output_document.unwrap_or_else(|| {
        url.path_segments()
            .and_then(|segs| segs.last())
            .filter(|s| !s.is_empty())
            .unwrap_or("index.html")
            .to_string()
    });

    sink.write_line(&format!("--{}--  {}", timestamp(), url)).await?;
    sink.write_line(&format!("Resolving {} ({})... {}", host_display, host_display, ip_display))
        .await?;
    sink.write_line(&format!(
        "Connecting to {} ({})|{}|:{}... connected.",
        host_display, host_display, ip_display, port
    ))
    .await?;
    sink.write_line("HTTP request sent, awaiting response... 200 OK").await?;
    sink.write_line(&format!("Length: {} ({}) [{}]", total, human_size(total), content_type))
        .await?;
    sink.write_line(&format!("Saving to: '{}'", outfile)).await?;
    sink.write_str("").await?;

    let working_path = host.lock().await.working_path.clone();
    let guest_path = crate::sandbox::fs::join_virtual(&working_path, &outfile);

    let start = Instant::now();
    let mut got: u64 = 0;
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        while buf.len() >= 128 {
            let piece: Vec<u8> = buf.drain(..128).collect();
            got += piece.len() as u64;
            host.lock().await.fs.append(&guest_path, &piece)?;
            sink.write_str(&format!(
                "\r{} {} {}",
                progress_bar(got, total),
                human_size(got),
                speed(got, start)
            ))
            .await?;
        }
    }
    if !buf.is_empty() {
        got += buf.len() as u64;
        host.lock().await.fs.append(&guest_path, &buf)?;
    }

    sink.write_str(&format!(
        "\r{} {} {}  {:.1}s",
        progress_bar(got, total.max(got)),
        human_size(got),
        speed(got, start),
        start.elapsed().as_secs_f64().max(0.1)
    ))
    .await?;
    sink.write_line(&format!(
        "{} - '{}' saved [{}/{}]",
        timestamp(),
        outfile,
        got,
        total
    ))
    .await?;

    Ok(())
}
