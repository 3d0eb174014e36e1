pub mod config;
pub mod error;

pub mod detection {
    pub mod domain {
        pub mod face_detector;
        pub mod face_encoder;
        pub mod face_locator;
    }
    pub mod infrastructure;
}

pub mod expression {
    pub mod domain {
        pub mod expression_vector;
        pub mod happiness_estimator;
        pub mod intensity;
        pub mod smile_detector;
    }
    pub mod infrastructure;
}

pub mod http {
    pub mod handler;
    pub mod message;
}

pub mod pipeline {
    pub mod detect_expressions_use_case;
    pub mod detection_result;
}

pub mod shared {
    pub mod constants;
    pub mod face_box;
    pub mod frame;
    pub mod image_payload;
}
