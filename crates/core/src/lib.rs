pub mod app_context;

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_camera_source;
        pub mod still_image_source;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_error;
        pub mod face_encoder;
        pub mod face_locator;
        pub mod object_tracker;
    }
    pub mod infrastructure;
}

pub mod identity {
    pub mod domain {
        pub mod identity;
        pub mod identity_matcher;
        pub mod snapshot_store;
    }
    pub mod infrastructure {
        pub mod fs_snapshot_store;
        pub mod sqlite_identity_store;
    }
}

pub mod pipeline {
    pub mod annotation;
    pub mod delete_face_use_case;
    pub mod face_pipeline;
    pub mod glyphs;
    pub mod object_pipeline;
    pub mod pipeline_logger;
    pub mod register_face_use_case;
    pub mod status;
    pub mod throttle;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod guarded_cell;
    pub mod model_resolver;
    pub mod region;
    pub mod settings;
}

pub mod stream {
    pub mod jpeg;
    pub mod mjpeg_stream;
}

#[cfg(test)]
mod testing;
