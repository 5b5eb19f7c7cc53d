use crate::physics::BodyId;
use crate::sim::render::Frame;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub frame: u64,
    pub sim_time: f64,
    pub body: BodyId,
    pub position: [f32; 3],
    pub rotation: [f32; 9],
}

/// Every pose sample the loop rendered, in frame order.
#[derive(Debug, Clone, Default)]
pub struct TelemetryLog {
    records: Vec<TelemetryRecord>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, frame: &Frame) {
        self.records.extend(frame.samples.iter().map(|s| TelemetryRecord {
            frame: frame.index,
            sim_time: frame.sim_time,
            body: s.body,
            position: s.position,
            rotation: s.rotation,
        }));
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one body, oldest first.
    pub fn body_track(&self, body: BodyId) -> impl Iterator<Item = &TelemetryRecord> {
        self.records.iter().filter(move |r| r.body == body)
    }

    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "frame,time,body,x,y,z,r00,r10,r20,r01,r11,r21,r02,r12,r22")?;
        for r in &self.records {
            write!(
                out,
                "{},{},{},{},{},{}",
                r.frame,
                r.sim_time,
                r.body.index(),
                r.position[0],
                r.position[1],
                r.position[2]
            )?;
            for v in r.rotation {
                write!(out, ",{v}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn export_csv(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(File::create(path)?);
        self.write_csv(&mut file)?;
        file.flush()?;
        info!(path = %path.display(), records = self.records.len(), "telemetry exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::render::PoseSample;

    #[test]
    fn csv_has_header_and_one_row_per_sample() {
        let mut log = TelemetryLog::new();
        let sample = PoseSample {
            body: BodyId(3),
            position: [1.0, 2.0, 3.0],
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        log.record(&Frame {
            index: 7,
            sim_time: 0.5,
            samples: vec![sample, sample],
        });

        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("frame,time,body"));
        assert_eq!(lines[1], "7,0.5,3,1,2,3,1,0,0,0,1,0,0,0,1");
        assert_eq!(log.body_track(BodyId(3)).count(), 2);
    }
}
