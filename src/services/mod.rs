pub mod assessments;
pub mod htp;
pub mod report_renderer;
