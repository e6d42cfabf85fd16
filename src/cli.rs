use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use camstream::{Config, SourceKind};

/// Camera streaming server: live MJPEG over HTTP
#[derive(Debug, Parser)]
#[command(name = "camstream", version)]
pub struct Cli {
    /// TOML configuration file, applied before command-line flags
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Camera index (default: 0)
    #[arg(long, value_name = "INDEX")]
    pub camera: Option<u32>,
    /// Frame width (default: 640)
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,
    /// Frame height (default: 480)
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,
    /// Frames per second (default: 30)
    #[arg(long)]
    pub fps: Option<u32>,
    /// Host to bind to (default: 0.0.0.0)
    #[arg(long)]
    pub host: Option<IpAddr>,
    /// Port to bind to (default: 5000)
    #[arg(long)]
    pub port: Option<u16>,
    /// Frame source
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,
}

impl Cli {
    /// Flags given on the command line win over every other source
    pub fn apply(&self, config: &mut Config) {
        let device = &mut config.device;
        if let Some(index) = self.camera {
            device.index = index;
        }
        if let Some(width) = self.width {
            device.width = width;
        }
        if let Some(height) = self.height {
            device.height = height;
        }
        if let Some(fps) = self.fps {
            device.fps = fps;
        }
        if let Some(source) = self.source {
            device.source = source;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "camstream",
            "--camera",
            "2",
            "--width",
            "1280",
            "--height",
            "720",
            "--port",
            "8080",
            "--source",
            "test-pattern",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.device.index, 2);
        assert_eq!((config.device.width, config.device.height), (1280, 720));
        assert_eq!(config.device.fps, 30);
        assert_eq!(config.device.source, SourceKind::TestPattern);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn no_flags_keeps_config() {
        let cli = Cli::parse_from(["camstream"]);
        let mut config = Config::default();
        config.device.width = 320;
        cli.apply(&mut config);
        assert_eq!(config.device.width, 320);
        assert_eq!(config.server.port, 5000);
    }
}
