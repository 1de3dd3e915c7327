use super::*;
use crate::debug;
use crate::measurement::DataKind;

use std::path::PathBuf;

/// Built-in component reporting on the host the agent runs on.
pub struct HostComponent {
    procfs: PathBuf,
}

impl Default for HostComponent {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl HostComponent {
    pub fn new(procfs: impl Into<PathBuf>) -> Self {
        Self {
            procfs: procfs.into(),
        }
    }

    /// Wrap into a component exposing measurement and availability.
    pub fn component(self) -> Component {
        let host = Arc::new(self);
        Component::new()
            .with_measurement(host.clone())
            .with_availability(host)
    }

    fn read(&self, file: &str) -> Result<String, FacetError> {
        Ok(std::fs::read_to_string(self.procfs.join(file))?)
    }

    fn loadavg(&self, idx: usize) -> Result<f64, FacetError> {
        let content = self.read("loadavg")?;
        content
            .split_whitespace()
            .nth(idx)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| FacetError::failed("malformed loadavg"))
    }

    // values in /proc/meminfo are in KiB
    fn meminfo(&self, key: &str) -> Result<f64, FacetError> {
        let content = self.read("meminfo")?;
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if parts.next().map(|k| k.trim_end_matches(':')) == Some(key) {
                return parts
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(|kib| kib * 1024.0)
                    .ok_or_else(|| FacetError::failed(format!("malformed meminfo: {key}")));
            }
        }
        Err(FacetError::failed(format!("meminfo has no {key}")))
    }

    fn stat(&self, key: &str) -> Result<f64, FacetError> {
        let content = self.read("stat")?;
        content
            .lines()
            .find_map(|line| {
                let mut parts = line.split_whitespace();
                (parts.next() == Some(key))
                    .then(|| parts.next().and_then(|v| v.parse().ok()))
                    .flatten()
            })
            .ok_or_else(|| FacetError::failed(format!("stat has no {key}")))
    }

    fn uptime(&self) -> Result<f64, FacetError> {
        let content = self.read("uptime")?;
        content
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| FacetError::failed("malformed uptime"))
    }

    fn numeric(&self, name: &str) -> Option<Result<f64, FacetError>> {
        let value = match name {
            "load.1m" => self.loadavg(0),
            "load.5m" => self.loadavg(1),
            "load.15m" => self.loadavg(2),
            "memory.free" => self.meminfo("MemFree"),
            "memory.available" => self.meminfo("MemAvailable"),
            "cpu.context_switches" => self.stat("ctxt"),
            "processes.forks" => self.stat("processes"),
            "uptime" => self.uptime(),
            _ => return None,
        };
        Some(value)
    }
}

impl MeasurementFacet for HostComponent {
    fn get_values(
        &self,
        report: &mut MeasurementReport,
        requests: &[MeasurementScheduleRequest],
    ) -> Result<(), FacetError> {
        for request in requests {
            if request.kind() == DataKind::Trait {
                match request.name() {
                    "os.release" => {
                        let release = self.read("sys/kernel/osrelease")?;
                        report.add_trait(request, Some(release.trim().to_string()));
                    }
                    other => debug!("host component has no trait named {other}"),
                }
                continue;
            }

            match self.numeric(request.name()) {
                Some(value) => report.add_numeric(request, value?),
                None => debug!("host component has no metric named {}", request.name()),
            }
        }

        Ok(())
    }
}

impl AvailabilityFacet for HostComponent {
    fn availability(&self) -> Result<Availability, FacetError> {
        if self.procfs.join("uptime").exists() {
            Ok(Availability::Up)
        } else {
            Ok(Availability::Down)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn procfs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("loadavg"), "0.50 0.25 0.10 1/100 4242\n").unwrap();
        std::fs::write(
            root.join("meminfo"),
            "MemTotal:       16000 kB\nMemFree:         2000 kB\nMemAvailable:    8000 kB\n",
        )
        .unwrap();
        std::fs::write(root.join("stat"), "cpu  1 2 3 4\nctxt 123456\nprocesses 789\n").unwrap();
        std::fs::write(root.join("uptime"), "3600.25 7000.00\n").unwrap();
        std::fs::create_dir_all(root.join("sys/kernel")).unwrap();
        std::fs::write(root.join("sys/kernel/osrelease"), "6.1.0-test\n").unwrap();
        dir
    }

    fn request(id: u32, name: &str, kind: DataKind) -> MeasurementScheduleRequest {
        MeasurementScheduleRequest::new(id, name, Duration::from_secs(60), kind)
    }

    #[test]
    fn reads_numeric_and_trait_values() {
        let dir = procfs();
        let host = HostComponent::new(dir.path());

        let requests = vec![
            request(1, "load.5m", DataKind::NumericAbsolute),
            request(2, "memory.available", DataKind::NumericAbsolute),
            request(3, "cpu.context_switches", DataKind::PerMinute),
            request(4, "os.release", DataKind::Trait),
            request(5, "no.such.metric", DataKind::NumericAbsolute),
        ];

        let mut report = MeasurementReport::new();
        host.get_values(&mut report, &requests).unwrap();

        let values: Vec<_> = report.numeric().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![Some(0.25), Some(8000.0 * 1024.0), Some(123456.0)]);
        assert!(report.numeric()[2].per_minute);
        assert_eq!(report.traits()[0].value.as_deref(), Some("6.1.0-test"));
    }

    #[test]
    fn missing_procfs_is_an_error_and_down() {
        let host = HostComponent::new("/nonexistent/procfs");
        let mut report = MeasurementReport::new();

        let requests = [request(1, "uptime", DataKind::NumericAbsolute)];
        let result = host.get_values(&mut report, &requests);
        assert!(result.is_err());
        assert_eq!(host.availability(), Ok(Availability::Down));
    }
}
