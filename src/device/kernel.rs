//! Wavefront kernel stages.

use std::fmt;

/// One stage of the wavefront path tracing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKernel {
    GenerateCameraRays,
    IntersectClosest,
    Volume,
    Background,
    Surface,
    Subsurface,
    IntersectShadow,
    Shadow,
}

impl DeviceKernel {
    /// Stages of one pass over the wavefront, in dispatch order.
    ///
    /// - `IntersectClosest` first, so `Volume` and `Background` see fresh hits.
    /// - `Background` after `Volume`: attenuated rays escaping the volume are
    ///   handed to the background stage in the same pass.
    /// - `IntersectShadow`/`Shadow` last: both `Surface` and `Subsurface`
    ///   emit shadow rays.
    pub const PATH_ITERATION: [DeviceKernel; 7] = [
        DeviceKernel::IntersectClosest,
        DeviceKernel::Volume,
        DeviceKernel::Background,
        DeviceKernel::Surface,
        DeviceKernel::Subsurface,
        DeviceKernel::IntersectShadow,
        DeviceKernel::Shadow,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            DeviceKernel::GenerateCameraRays => "GENERATE_CAMERA_RAYS",
            DeviceKernel::IntersectClosest => "INTERSECT_CLOSEST",
            DeviceKernel::Volume => "VOLUME",
            DeviceKernel::Background => "BACKGROUND",
            DeviceKernel::Surface => "SURFACE",
            DeviceKernel::Subsurface => "SUBSURFACE",
            DeviceKernel::IntersectShadow => "INTERSECT_SHADOW",
            DeviceKernel::Shadow => "SHADOW",
        }
    }
}

impl fmt::Display for DeviceKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
