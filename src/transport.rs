use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One named event on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(event: &str, data: Option<Value>) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("Failed to decode event envelope")
    }

    /// Decode one raw line as read off the wire. Bytes that are not UTF-8
    /// are an error for this line only.
    pub fn decode_bytes(line: &[u8]) -> Result<Self> {
        let line = std::str::from_utf8(line).context("Event line is not valid UTF-8")?;
        Self::decode(line.trim_end())
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode event envelope")
    }
}

/// Outbound half of a bidirectional event channel
pub trait Transport {
    fn emit(&mut self, event: &str, data: Option<Value>) -> Result<()>;
}

/// Somewhere compiled markup can be placed, addressed by target id
pub trait RenderTarget {
    fn replace(&mut self, target: &str, markup: &str) -> Result<()>;
}

/// Writes one JSON envelope per line
pub struct LineTransport<W: Write> {
    writer: W,
}

impl<W: Write> LineTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for LineTransport<W> {
    fn emit(&mut self, event: &str, data: Option<Value>) -> Result<()> {
        let line = Envelope::new(event, data).encode()?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Records every emitted event
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub sent: Vec<Envelope>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_events(&self) -> Vec<&str> {
        self.sent.iter().map(|e| e.event.as_str()).collect()
    }
}

impl Transport for MemoryTransport {
    fn emit(&mut self, event: &str, data: Option<Value>) -> Result<()> {
        self.sent.push(Envelope::new(event, data));
        Ok(())
    }
}

/// Keeps the current content of each target in memory
#[derive(Debug, Default)]
pub struct MemoryRenderTarget {
    targets: HashMap<String, String>,
    replacements: usize,
}

impl MemoryRenderTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, target: &str) -> Option<&str> {
        self.targets.get(target).map(String::as_str)
    }

    pub fn replacements(&self) -> usize {
        self.replacements
    }
}

impl RenderTarget for MemoryRenderTarget {
    fn replace(&mut self, target: &str, markup: &str) -> Result<()> {
        self.targets.insert(target.to_string(), markup.to_string());
        self.replacements += 1;
        Ok(())
    }
}

/// Renders each target into `<dir>/<target>.html`
pub struct FileRenderTarget {
    dir: PathBuf,
}

impl FileRenderTarget {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, target: &str) -> Result<PathBuf> {
        let valid = !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            anyhow::bail!("Invalid render target id {:?}", target);
        }
        Ok(self.dir.join(format!("{}.html", target)))
    }
}

impl RenderTarget for FileRenderTarget {
    fn replace(&mut self, target: &str, markup: &str) -> Result<()> {
        let path = self.path_for(target)?;
        fs::write(&path, markup).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_transport_writes_one_envelope_per_line() {
        let mut transport = LineTransport::new(Vec::new());
        transport.emit("get_handshakes", None).unwrap();
        transport.emit("applet_update_name", Some(json!("morning sync"))).unwrap();

        let output = String::from_utf8(transport.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, vec![
            r#"{"event":"get_handshakes"}"#,
            r#"{"event":"applet_update_name","data":"morning sync"}"#,
        ]);
    }

    #[test]
    fn envelopes_decode_with_and_without_data() {
        assert_eq!(Envelope::decode(r#"{"event":"connect"}"#).unwrap(), Envelope::new("connect", None));
        assert_eq!(
            Envelope::decode(r#"{"event":"get_handshakes","data":"[]"}"#).unwrap().data,
            Some(json!("[]"))
        );
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn raw_lines_with_bad_bytes_fail_alone() {
        assert!(Envelope::decode_bytes(b"{\"event\":\"applet_update_name\",\"data\":\"caf\xe9\"}\n").is_err());
        assert_eq!(
            Envelope::decode_bytes("{\"event\":\"applet_update_name\",\"data\":\"café\"}\r\n".as_bytes()).unwrap(),
            Envelope::new("applet_update_name", Some(json!("café")))
        );
    }

    #[test]
    fn file_target_writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = FileRenderTarget::new(&dir.path().join("render")).unwrap();

        target.replace("plugin_builder", "<form></form>").unwrap();
        target.replace("plugin_builder", "<form>2</form>").unwrap();

        let written = fs::read_to_string(dir.path().join("render/plugin_builder.html")).unwrap();
        assert_eq!(written, "<form>2</form>");
    }

    #[test]
    fn file_target_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = FileRenderTarget::new(dir.path()).unwrap();
        assert!(target.replace("../escape", "x").is_err());
        assert!(target.replace("", "x").is_err());
    }
}
