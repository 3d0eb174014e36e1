pub mod cascade_file_provider;
pub mod cascade_smile_detector;
pub mod haar_cascade;
