//! YOLO face detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing of the grayscale input, inference,
//! neighbour-counting NMS and conversion to frame-space [`FaceRect`]s.
use std::path::Path;

use crate::detection::domain::face_detector::{DetectionParams, FaceDetector};
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates overlapping more than this are grouped into one face.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxFaceDetector {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxFaceDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded face model {} ({input_size}x{input_size} input)",
            model_path.display()
        );
        Ok(Self {
            session,
            input_size,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(
        &mut self,
        gray: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<FaceRect>, Box<dyn std::error::Error>> {
        if gray.channels() != 1 {
            return Err(format!("expected a grayscale frame, got {} channels", gray.channels()).into());
        }
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(gray, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("face model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();

        // Output is [1, features, detections] (transposed) or [1, detections, features].
        if shape.len() != 3 {
            return Err(format!("Unexpected face model output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 {
            return Err(format!("face model rows have {num_feats} values, need 5").into());
        }
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut candidates = Vec::new();
        for i in 0..num_dets {
            let at = |f: usize| {
                if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                }
            };

            // row format: [cx, cy, w, h, conf, ...keypoints]
            let conf = at(4) as f64;
            if conf < params.confidence {
                continue;
            }
            let (cx, cy, w, h) = (at(0) as f64, at(1) as f64, at(2) as f64, at(3) as f64);
            candidates.push(Candidate {
                x1: (cx - w / 2.0 - pad_x as f64) / scale,
                y1: (cy - h / 2.0 - pad_y as f64) / scale,
                x2: (cx + w / 2.0 - pad_x as f64) / scale,
                y2: (cy + h / 2.0 - pad_y as f64) / scale,
                confidence: conf,
            });
        }

        let grouped = group_candidates(&mut candidates, NMS_IOU_THRESH, params.scale_factor);
        Ok(select_faces(&grouped, params, gray.width(), gray.height()))
    }
}

/// Hardware providers worth trying on this platform; ORT falls back to CPU
/// when one fails to register.
fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a grayscale frame to `target_size` × `target_size`,
/// replicating luma into the model's three input channels.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(gray: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = gray.width() as f64;
    let fh = gray.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let fill = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), fill);

    let src = gray.data();
    let src_h = gray.height() as usize;
    let src_w = gray.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let v = src[src_y * src_w + src_x] as f32 / 255.0;
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = v;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl Candidate {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    fn size(&self) -> f64 {
        ((self.x2 - self.x1) * (self.y2 - self.y1)).max(0.0).sqrt()
    }
}

#[derive(Clone, Debug)]
struct Group {
    best: Candidate,
    neighbors: u32,
}

/// Greedy NMS that also counts, for each kept box, how many suppressed
/// candidates supported it at a similar scale.
fn group_candidates(dets: &mut [Candidate], iou_thresh: f64, scale_factor: f64) -> Vec<Group> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut groups = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0;
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&dets[i].corners(), &dets[j].corners()) > iou_thresh {
                suppressed[j] = true;
                if similar_scale(&dets[i], &dets[j], scale_factor) {
                    neighbors += 1;
                }
            }
        }
        groups.push(Group {
            best: dets[i].clone(),
            neighbors,
        });
    }
    groups
}

fn similar_scale(a: &Candidate, b: &Candidate, scale_factor: f64) -> bool {
    let (sa, sb) = (a.size(), b.size());
    if sa <= 0.0 || sb <= 0.0 {
        return false;
    }
    sa.max(sb) / sa.min(sb) <= scale_factor
}

fn select_faces(
    groups: &[Group],
    params: &DetectionParams,
    frame_w: u32,
    frame_h: u32,
) -> Vec<FaceRect> {
    groups
        .iter()
        .filter(|g| g.neighbors >= params.min_neighbors)
        .filter_map(|g| {
            FaceRect::from_corners(g.best.x1, g.best.y1, g.best.x2, g.best.y2, frame_w, frame_h)
        })
        .filter(|r| r.width >= params.min_width && r.height >= params.min_height)
        .collect()
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn candidate(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Candidate {
        Candidate {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    fn gray(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height) as usize], width, height, 1)
    }

    fn params(min_neighbors: u32) -> DetectionParams {
        DetectionParams {
            min_neighbors,
            ..DetectionParams::default()
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, content 640x320, 160 rows of padding on top
        let (tensor, scale, pad_x, pad_y) = letterbox(&gray(200, 100, 128), 640);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(scale, 3.2);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 160);
    }

    #[test]
    fn test_letterbox_replicates_luma_into_all_channels() {
        let (tensor, _, pad_x, pad_y) = letterbox(&gray(100, 50, 255), 640);
        let (y, x) = (pad_y as usize + 1, pad_x as usize + 1);
        for c in 0..3 {
            assert_relative_eq!(tensor[[0, c, y, x]], 1.0);
        }
        // padding row above the content keeps the fill value
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 114.0 / 255.0);
    }

    #[test]
    fn test_grouping_counts_similar_scale_neighbours() {
        let mut dets = vec![
            candidate(0.0, 0.0, 100.0, 100.0, 0.9),
            candidate(2.0, 2.0, 102.0, 102.0, 0.8),
            candidate(4.0, 0.0, 104.0, 100.0, 0.7),
        ];
        let groups = group_candidates(&mut dets, NMS_IOU_THRESH, 1.1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].neighbors, 2);
        assert_relative_eq!(groups[0].best.confidence, 0.9);
    }

    #[test]
    fn test_grouping_ignores_neighbours_at_distant_scale() {
        // The second box overlaps enough to be suppressed but is ~1.4x smaller.
        let mut dets = vec![
            candidate(0.0, 0.0, 100.0, 100.0, 0.9),
            candidate(0.0, 0.0, 70.0, 70.0, 0.8),
        ];
        let groups = group_candidates(&mut dets, 0.45, 1.1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].neighbors, 0);
    }

    #[test]
    fn test_grouping_keeps_separate_faces() {
        let mut dets = vec![
            candidate(0.0, 0.0, 50.0, 50.0, 0.9),
            candidate(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        let groups = group_candidates(&mut dets, NMS_IOU_THRESH, 1.1);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_grouping_empty_input() {
        let mut dets: Vec<Candidate> = Vec::new();
        assert!(group_candidates(&mut dets, NMS_IOU_THRESH, 1.1).is_empty());
    }

    #[test]
    fn test_select_requires_min_neighbors() {
        let groups = vec![
            Group {
                best: candidate(10.0, 10.0, 50.0, 50.0, 0.9),
                neighbors: 5,
            },
            Group {
                best: candidate(60.0, 10.0, 100.0, 50.0, 0.9),
                neighbors: 1,
            },
        ];
        let faces = select_faces(&groups, &params(5), 200, 200);
        assert_eq!(faces, vec![FaceRect::new(10, 10, 40, 40).unwrap()]);
    }

    #[test]
    fn test_default_tuning_keeps_a_face_seen_by_adjacent_anchors() {
        // A real face lights up neighbouring grid cells with near-identical
        // boxes; a lone low-support box is treated as noise.
        let mut dets = vec![
            candidate(40.0, 40.0, 100.0, 100.0, 0.82),
            candidate(42.0, 41.0, 101.0, 100.0, 0.64),
            candidate(150.0, 20.0, 190.0, 60.0, 0.55),
        ];
        let defaults = DetectionParams::default();
        let groups = group_candidates(&mut dets, NMS_IOU_THRESH, defaults.scale_factor);
        let faces = select_faces(&groups, &defaults, 200, 200);
        assert_eq!(faces, vec![FaceRect::new(40, 40, 60, 60).unwrap()]);
    }

    #[test]
    fn test_select_drops_faces_below_min_size() {
        let groups = vec![Group {
            best: candidate(0.0, 0.0, 20.0, 40.0, 0.9),
            neighbors: 9,
        }];
        assert!(select_faces(&groups, &params(0), 200, 200).is_empty());
    }

    #[test]
    fn test_select_clamps_to_frame() {
        let groups = vec![Group {
            best: candidate(-10.0, 60.0, 40.0, 130.0, 0.9),
            neighbors: 0,
        }];
        let faces = select_faces(&groups, &params(0), 100, 100);
        assert_eq!(faces, vec![FaceRect::new(0, 60, 40, 40).unwrap()]);
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_bbox_iou_perfect() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_relative_eq!(bbox_iou(&b, &b), 1.0);
    }
}
