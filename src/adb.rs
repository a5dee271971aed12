//! Android device transport over the `adb` command-line tool

use crate::config::DeviceConfig;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};
use swipescan_core::{GestureSink, ScreenshotSource};

/// Parse `wm size` output, preferring the override size over the physical one.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut override_size = None;

    for line in output.lines() {
        let Some((kind, value)) = line.split_once(':') else {
            continue;
        };
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>()) else {
            continue;
        };
        if kind.to_lowercase().contains("override") {
            override_size = Some((w, h));
        } else {
            physical = Some((w, h));
        }
    }
    override_size.or(physical)
}

fn millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// A device reached through `adb [-s serial]`
pub struct AdbDevice {
    adb_path: PathBuf,
    serial: Option<String>,
    images_dir: PathBuf,
    resolution: Option<(u32, u32)>,
}

impl AdbDevice {
    /// Check that a device is attached and ready.
    pub fn connect(config: &DeviceConfig) -> Result<Self> {
        let device = Self {
            adb_path: config.adb_path.clone(),
            serial: config.serial.clone(),
            images_dir: config.images_dir.clone(),
            resolution: None,
        };

        let state = device.run(&["get-state"]).context("adb not available; is platform-tools on PATH?")?;
        let state = String::from_utf8_lossy(&state.stdout).trim().to_string();
        if state != "device" {
            bail!("adb device not ready (state: {:?})", state);
        }

        fs::create_dir_all(&device.images_dir)
            .with_context(|| format!("Failed to create images directory: {:?}", device.images_dir))?;
        info!(
            "Connected to {} ({:?})",
            device.serial.as_deref().unwrap_or("default device"),
            device.adb_path
        );
        Ok(device)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            command.args(["-s", serial]);
        }
        command
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = self
            .command()
            .args(args)
            .output()
            .with_context(|| format!("Failed to run adb {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "adb {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }

    fn shell(&self, command: &str) -> Result<String> {
        debug!("adb shell {}", command);
        let mut args = vec!["shell"];
        args.extend(command.split_whitespace());
        let output = self.run(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ScreenshotSource for AdbDevice {
    fn capture_screenshot(&mut self, label: &str) -> Result<PathBuf> {
        let output = self.run(&["exec-out", "screencap", "-p"])?;
        if output.stdout.is_empty() {
            bail!("screencap returned no data");
        }

        let path = self.images_dir.join(format!("{}_{}.png", label, millis()));
        fs::write(&path, &output.stdout).with_context(|| format!("Failed to write screenshot: {:?}", path))?;
        debug!("Captured {:?}", path);
        Ok(path)
    }
}

impl GestureSink for AdbDevice {
    fn swipe(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()> {
        self.shell(&format!("input swipe {} {} {} {} {}", x1, y1, x2, y2, duration_ms))?;
        Ok(())
    }

    fn tap(&mut self, x: i32, y: i32) -> Result<()> {
        self.shell(&format!("input tap {} {}", x, y))?;
        Ok(())
    }

    fn screen_resolution(&mut self) -> Result<(u32, u32)> {
        if let Some(resolution) = self.resolution {
            return Ok(resolution);
        }
        let output = self.shell("wm size")?;
        let Some(resolution) = parse_wm_size(&output) else {
            bail!("Unexpected wm size output: {:?}", output.trim());
        };
        info!("Screen resolution {}x{}", resolution.0, resolution.1);
        self.resolution = Some(resolution);
        Ok(resolution)
    }
}
