//! Deterministic names for staged temp files and uploaded blob keys.
//!
//! Temp names embed the job's execution id so concurrently running jobs
//! never collide in the shared temp root.

use crate::types::{DbId, JobId};

/// Blob namespace for inference results.
pub const RESULTS_PREFIX: &str = "results";

/// Blob namespace for normalized conversions.
pub const CONVERTED_PREFIX: &str = "converted";

/// Image formats the result encoder can write back in their own format.
const WRITABLE_IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp"];

/// Extension of a blob key or path including the dot, or `""` if there is none.
///
/// ```
/// use mediaq_core::naming::file_extension;
///
/// assert_eq!(file_extension("uploads/clip.MKV"), ".MKV");
/// assert_eq!(file_extension("uploads/archive.tar.gz"), ".gz");
/// assert_eq!(file_extension("uploads/.hidden"), "");
/// assert_eq!(file_extension("noext"), "");
/// ```
pub fn file_extension(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => file_name[idx..].to_string(),
    }
}

/// Local name of a downloaded source: `{job_id}{ext}`.
pub fn source_temp_name(job_id: JobId, ext: &str) -> String {
    format!("{job_id}{ext}")
}

/// Local name of a conversion output: `converted_{job_id}.mp4`.
pub fn converted_temp_name(job_id: JobId) -> String {
    format!("converted_{job_id}.mp4")
}

/// Local name of an inference result: `result_{job_id}{ext}`.
pub fn result_temp_name(job_id: JobId, ext: &str) -> String {
    format!("result_{job_id}{ext}")
}

/// Local name of the raw (pre-transcode) annotated video: `raw_{job_id}.mp4`.
pub fn raw_video_temp_name(job_id: JobId) -> String {
    format!("raw_{job_id}.mp4")
}

/// Blob key of a normalized conversion, keyed by media so reconversion overwrites it.
pub fn converted_key(media_id: DbId) -> String {
    format!("{CONVERTED_PREFIX}/converted_{media_id}.mp4")
}

/// Blob key of an annotated image.
pub fn image_result_key(job_id: JobId, ext: &str) -> String {
    format!("{RESULTS_PREFIX}/{}", result_temp_name(job_id, ext))
}

/// Blob key of an annotated video.
pub fn video_result_key(job_id: JobId) -> String {
    format!("{RESULTS_PREFIX}/{}", result_temp_name(job_id, ".mp4"))
}

/// Extension the annotated image is written with: the source's own when the
/// encoder supports it, `.png` otherwise.
pub fn image_output_extension(source_ext: &str) -> String {
    let lower = source_ext.to_ascii_lowercase();
    if WRITABLE_IMAGE_EXTENSIONS.contains(&lower.as_str()) {
        lower
    } else {
        ".png".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        uuid::Uuid::parse_str("6f1c1f7e-8a55-4c1e-9d53-3f2a2b9f0a10").unwrap()
    }

    #[test]
    fn temp_names_embed_job_id() {
        assert_eq!(
            source_temp_name(job(), ".avi"),
            "6f1c1f7e-8a55-4c1e-9d53-3f2a2b9f0a10.avi"
        );
        assert_eq!(
            converted_temp_name(job()),
            "converted_6f1c1f7e-8a55-4c1e-9d53-3f2a2b9f0a10.mp4"
        );
        assert_eq!(
            raw_video_temp_name(job()),
            "raw_6f1c1f7e-8a55-4c1e-9d53-3f2a2b9f0a10.mp4"
        );
    }

    #[test]
    fn distinct_jobs_never_share_names() {
        let other = uuid::Uuid::new_v4();
        assert_ne!(source_temp_name(job(), ".mp4"), source_temp_name(other, ".mp4"));
    }

    #[test]
    fn result_keys_live_under_results() {
        assert_eq!(
            image_result_key(job(), ".jpg"),
            "results/result_6f1c1f7e-8a55-4c1e-9d53-3f2a2b9f0a10.jpg"
        );
        assert!(video_result_key(job()).starts_with("results/"));
        assert!(video_result_key(job()).ends_with(".mp4"));
    }

    #[test]
    fn converted_key_is_per_media() {
        assert_eq!(converted_key(42), "converted/converted_42.mp4");
    }

    #[test]
    fn image_extension_falls_back_to_png() {
        assert_eq!(image_output_extension(".JPG"), ".jpg");
        assert_eq!(image_output_extension(".webp"), ".webp");
        assert_eq!(image_output_extension(".bmp"), ".png");
        assert_eq!(image_output_extension(""), ".png");
    }
}
