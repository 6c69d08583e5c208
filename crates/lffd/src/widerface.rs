//! WIDER FACE ground-truth annotations.
//!
//! The dataset ships its boxes in `wider_face_split/wider_face_{phase}_bbx_gt.txt`, a plain text
//! file consisting of one record per image:
//!
//! ```text
//! 0--Parade/0_Parade_marchingband_1_849.jpg
//! 1
//! 449 330 122 149 0 0 0 0 0 0
//! ```
//!
//! The first line is the image path (relative to `WIDER_{phase}/images`), the second the number of
//! faces, followed by one line per face starting with `x y width height`. The remaining attribute
//! columns (blur, occlusion, pose, ...) are not used here. Images without faces are followed by a
//! single all-zero placeholder line.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};

use crate::rect::FaceBox;

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }

    /// Returns the path of the annotation file of this split, relative to the dataset root.
    pub fn annotation_path(&self, root: &Path) -> PathBuf {
        root.join("wider_face_split")
            .join(format!("wider_face_{}_bbx_gt.txt", self.as_str()))
    }

    /// Returns the image directory of this split, relative to the dataset root.
    pub fn image_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("WIDER_{}", self.as_str())).join("images")
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground-truth faces of a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Image path relative to the split's image directory.
    pub image: String,
    pub boxes: Vec<FaceBox>,
    /// Number of annotated boxes that were dropped for having zero width or height.
    pub degenerate: usize,
}

impl Annotation {
    /// Removes all faces smaller than `min_size` pixels (as measured by [`FaceBox::size`]).
    pub fn discard_small_faces(&mut self, min_size: f32) {
        self.boxes.retain(|b| b.size() >= min_size);
    }
}

/// Parses the contents of a WIDER FACE `bbx_gt` annotation file.
pub fn parse_annotations(text: &str) -> anyhow::Result<Vec<Annotation>> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()));
    let mut annotations = Vec::new();

    while let Some((line_no, image)) = lines.next() {
        if image.is_empty() {
            // trailing newlines
            continue;
        }

        let Some((count_line, count)) = lines.next() else {
            bail!("line {line_no}: missing face count for image '{image}'");
        };
        let count: usize = count
            .parse()
            .with_context(|| format!("line {count_line}: invalid face count '{count}'"))?;

        let mut annotation = Annotation {
            image: image.to_string(),
            boxes: Vec::with_capacity(count),
            degenerate: 0,
        };

        if count == 0 {
            // placeholder row
            lines.next();
        }

        for _ in 0..count {
            let Some((box_line, row)) = lines.next() else {
                bail!("line {count_line}: expected {count} faces for image '{image}'");
            };
            match parse_box(row).with_context(|| format!("line {box_line}"))? {
                Some(b) => annotation.boxes.push(b),
                None => annotation.degenerate += 1,
            }
        }

        annotations.push(annotation);
    }

    log::debug!("parsed annotations of {} images", annotations.len());
    Ok(annotations)
}

/// Parses `x y w h ...` into a box, returning `None` for boxes without area.
fn parse_box(line: &str) -> anyhow::Result<Option<FaceBox>> {
    let mut values = [0.0f32; 4];
    let mut fields = line.split_whitespace();
    for value in &mut values {
        let Some(field) = fields.next() else {
            bail!("expected at least 4 box values, got '{line}'");
        };
        let int: i32 = field
            .parse()
            .with_context(|| format!("invalid box value '{field}'"))?;
        *value = int as f32;
    }

    let [x, y, w, h] = values;
    if w < 0.0 || h < 0.0 {
        bail!("box has negative size: '{line}'");
    }
    if w == 0.0 || h == 0.0 {
        return Ok(None);
    }
    FaceBox::try_new(x, y, x + w, y + h).map(Some)
}

/// Reads and parses the annotation file of a split.
pub fn load_annotations<P: AsRef<Path>>(root: P, phase: Phase) -> anyhow::Result<Vec<Annotation>> {
    load_annotations_impl(root.as_ref(), phase)
}

fn load_annotations_impl(root: &Path, phase: Phase) -> anyhow::Result<Vec<Annotation>> {
    let path = phase.annotation_path(root);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {phase} annotations from {}", path.display()))?;
    parse_annotations(&text).with_context(|| format!("failed to parse {}", path.display()))
}
