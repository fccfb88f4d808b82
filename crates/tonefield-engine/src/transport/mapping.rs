use tonefield_plugin_api::{DetectedPoint, PointBatch, Rect, Size};

/// Maps detector-space points into the sampler's visible region and drops
/// points that land outside the canvas.
pub(crate) fn map_points(
    points: &[DetectedPoint],
    source: Option<Size>,
    visible: Option<Rect>,
    canvas: Option<Size>,
) -> PointBatch {
    points
        .iter()
        .map(|point| map_point(*point, source, visible))
        .filter(|point| within_canvas(point, canvas))
        .collect()
}

fn map_point(point: DetectedPoint, source: Option<Size>, visible: Option<Rect>) -> DetectedPoint {
    match (source, visible) {
        (Some(source), Some(visible)) if !source.is_empty() => DetectedPoint {
            id: point.id,
            x: visible.x + point.x / source.width * visible.width,
            y: visible.y + point.y / source.height * visible.height,
        },
        _ => point,
    }
}

fn within_canvas(point: &DetectedPoint, canvas: Option<Size>) -> bool {
    match canvas {
        Some(canvas) => {
            point.x >= 0.0 && point.x < canvas.width && point.y >= 0.0 && point.y < canvas.height
        },
        None => true,
    }
}
