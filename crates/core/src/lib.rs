pub mod detection {
    pub mod domain {
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod recognition {
    pub mod domain {
        pub mod confidence_gate;
        pub mod face_recognizer;
    }
    pub mod infrastructure;
}

pub mod identity {
    pub mod domain {
        pub mod identity_store;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod capture_error;
    pub mod capture_worker;
    pub mod frame_annotator;
    pub mod frame_processor;
    pub mod frame_publisher;
    pub mod infrastructure;
    pub mod pipeline_logger;
    pub mod worker_state;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod gray_mat;
    pub mod model_resolver;
    pub mod region;
    pub mod settings;
}
