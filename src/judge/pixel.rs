//! Offline judge comparing screenshots pixel by pixel.

use async_trait::async_trait;

use super::error::{JudgeError, JudgeResult};
use super::image::pixel_similarity;
use super::{Judge, JudgeRequest, VisualJudgment};

/// Scores the after screenshot against the ground truth without any API.
///
/// Much stricter than a vision model: any rendering noise lowers the score.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelJudge;

#[async_trait]
impl Judge for PixelJudge {
    fn name(&self) -> &str {
        "pixel"
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let before = request.before.clone();
        let after = request.after.clone();
        let ground_truth = request.ground_truth.clone();

        let (score, unchanged) = tokio::task::spawn_blocking(move || {
            let score = pixel_similarity(&after, &ground_truth)?;
            let unchanged = pixel_similarity(&before, &after)?;
            Ok::<_, JudgeError>((score, unchanged))
        })
        .await
        .map_err(|e| JudgeError::image(&request.after, e))??;

        let rationale = format!(
            "Pixel similarity of after screenshot to ground truth: {:.3}. Before/after similarity: {:.3}{}",
            score,
            unchanged,
            if unchanged >= 1.0 { " (page did not change)" } else { "" }
        );

        Ok(VisualJudgment {
            score,
            raw_response: rationale.clone(),
            rationale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeContext;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pixel_judge_scores_after_against_ground_truth() {
        let dir = TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name);
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(path("before.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 255])).save(path("after.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 255])).save(path("gt.png")).unwrap();

        let request = JudgeRequest {
            task_id: "t1".to_string(),
            before: path("before.png"),
            after: path("after.png"),
            ground_truth: path("gt.png"),
            context: JudgeContext::default(),
        };

        let judgment = PixelJudge.judge(&request).await.unwrap();
        assert_eq!(judgment.score, 1.0);
        assert!(!judgment.rationale.contains("did not change"));
    }

    #[tokio::test]
    async fn test_pixel_judge_notes_unchanged_page() {
        let dir = TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name);
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(path("before.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(path("after.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])).save(path("gt.png")).unwrap();

        let request = JudgeRequest {
            task_id: "t1".to_string(),
            before: path("before.png"),
            after: path("after.png"),
            ground_truth: path("gt.png"),
            context: JudgeContext::default(),
        };

        let judgment = PixelJudge.judge(&request).await.unwrap();
        assert!(judgment.score < 0.5);
        assert!(judgment.rationale.contains("did not change"));
    }

    #[tokio::test]
    async fn test_pixel_judge_missing_image() {
        let request = JudgeRequest {
            task_id: "t1".to_string(),
            before: "/nonexistent/a.png".into(),
            after: "/nonexistent/b.png".into(),
            ground_truth: "/nonexistent/c.png".into(),
            context: JudgeContext::default(),
        };
        assert!(matches!(
            PixelJudge.judge(&request).await,
            Err(JudgeError::Image { .. })
        ));
    }
}
