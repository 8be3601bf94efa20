//! Section buffers making up a Collada document.
//!
//! Components append tab-indented lines to named sections in whatever order
//! they run; [`Document::render`] always emits the sections in [`Section`]
//! order.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;

pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";
pub const COLLADA_OPEN: &str =
    "<COLLADA xmlns=\"http://www.collada.org/2005/11/COLLADASchema\" version=\"1.4.1\">";
pub const COLLADA_CLOSE: &str = "</COLLADA>";

/// Document sections in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Asset,
    Images,
    Effects,
    Materials,
    Geometries,
    Morphs,
    Skins,
    Controllers,
    Cameras,
    Lights,
    AnimationClips,
    Nodes,
    Animations,
    Scene,
    Extras,
}

#[derive(Debug, Default)]
pub struct Document {
    sections: BTreeMap<Section, Vec<String>>,
    last_id: u32,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a document-unique element id of the form `id-<kind>-<n>`.
    pub fn new_id(&mut self, kind: &str) -> String {
        self.last_id += 1;
        format!("id-{}-{}", kind, self.last_id)
    }

    /// Append one line to a section, indented by `indent` tabs.
    pub fn writel(&mut self, section: Section, indent: usize, text: impl AsRef<str>) {
        let text = text.as_ref();
        let mut line = String::with_capacity(indent + text.len());
        for _ in 0..indent {
            line.push('\t');
        }
        line.push_str(text);
        self.sections.entry(section).or_default().push(line);
    }

    pub fn lines(&self, section: Section) -> &[String] {
        self.sections.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_section(&self, section: Section) -> bool {
        self.sections.contains_key(&section)
    }

    /// Move every line of `from` to the end of `into`.
    pub fn fold_into(&mut self, from: Section, into: Section) {
        if let Some(lines) = self.sections.remove(&from) {
            self.sections.entry(into).or_default().extend(lines);
        }
    }

    /// Drop sections that consist of nothing but an opening tag directly
    /// followed by its closing tag.
    pub fn purge_empty(&mut self) {
        self.sections
            .retain(|_, lines| !(lines.len() == 2 && is_empty_pair(&lines[0], &lines[1])));
    }

    /// Serialize the whole document.
    pub fn render(&self) -> String {
        let body: usize = self.sections.values().flatten().map(|l| l.len() + 1).sum();
        let mut out = String::with_capacity(body + 256);

        writeln!(out, "{}", XML_HEADER).unwrap();
        writeln!(out, "{}", COLLADA_OPEN).unwrap();
        for lines in self.sections.values() {
            for line in lines {
                writeln!(out, "{}", line).unwrap();
            }
        }
        writeln!(out, "{}", COLLADA_CLOSE).unwrap();
        out
    }

    /// Write the rendered document to `path`.
    ///
    /// The file is written to a temporary file in the destination directory
    /// and then moved into place, so `path` either receives the whole document
    /// or is left untouched.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.flush()?;
        tmp.persist(path)?;
        Ok(())
    }
}

fn is_empty_pair(open: &str, close: &str) -> bool {
    let open = open.trim_start();
    let close = close.trim_start();
    match (open.strip_prefix('<'), close.strip_prefix("</")) {
        (Some(name), Some(closing)) => !name.starts_with('/') && name == closing,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_render_in_fixed_order() {
        let mut doc = Document::new();
        doc.writel(Section::Extras, 0, "<extra/>");
        doc.writel(Section::Scene, 0, "<scene/>");
        doc.writel(Section::Nodes, 0, "<library_visual_scenes/>");
        doc.writel(Section::Asset, 0, "<asset/>");
        doc.writel(Section::Geometries, 1, "<geometry/>");

        let out = doc.render();
        let pos = |s: &str| out.find(s).unwrap();
        assert!(out.starts_with(XML_HEADER));
        assert!(pos("<asset/>") < pos("\t<geometry/>"));
        assert!(pos("<geometry/>") < pos("<library_visual_scenes/>"));
        assert!(pos("<library_visual_scenes/>") < pos("<scene/>"));
        assert!(pos("<scene/>") < pos("<extra/>"));
        assert!(out.trim_end().ends_with(COLLADA_CLOSE));
    }

    #[test]
    fn test_purge_only_removes_adjacent_pairs() {
        let mut doc = Document::new();
        doc.writel(Section::Geometries, 0, "<library_geometries>");
        doc.writel(Section::Geometries, 0, "</library_geometries>");
        doc.writel(Section::Controllers, 0, "<library_controllers>");
        doc.writel(Section::Controllers, 0, "   ");
        doc.writel(Section::Controllers, 0, "</library_controllers>");
        doc.writel(Section::Scene, 0, "<scene>");
        doc.writel(Section::Scene, 0, "</other>");

        doc.purge_empty();
        assert!(!doc.has_section(Section::Geometries));
        assert!(doc.has_section(Section::Controllers));
        assert!(doc.has_section(Section::Scene));
    }

    #[test]
    fn test_fold_appends_and_removes() {
        let mut doc = Document::new();
        doc.writel(Section::Controllers, 0, "<library_controllers>");
        doc.writel(Section::Skins, 1, "<controller/>");
        doc.fold_into(Section::Skins, Section::Controllers);
        doc.writel(Section::Controllers, 0, "</library_controllers>");

        assert!(!doc.has_section(Section::Skins));
        assert_eq!(
            doc.lines(Section::Controllers),
            &["<library_controllers>", "\t<controller/>", "</library_controllers>"]
        );
    }

    #[test]
    fn test_new_id_counts_up() {
        let mut doc = Document::new();
        assert_eq!(doc.new_id("scene"), "id-scene-1");
        assert_eq!(doc.new_id("mesh"), "id-mesh-2");
    }

    #[test]
    fn test_write_to_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dae");
        std::fs::write(&path, "old").unwrap();

        let mut doc = Document::new();
        doc.writel(Section::Asset, 0, "<asset/>");
        doc.write_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<asset/>"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.dae");
        assert!(Document::new().write_to(&path).is_err());
        assert!(!path.exists());
    }
}
