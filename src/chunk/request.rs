use serde::{Deserialize, Serialize};

use crate::chunk::pool::Job;
use crate::error::BuildError;
use crate::terrain::color::{ColorField, ColorFieldParams};
use crate::terrain::height::{HeightFieldParams, HeightStack};
use crate::terrain::mesh::{build_patch, MeshData, PatchRequest};
use crate::terrain::sphere::{build_sphere_patch, SphereRequest};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Patch(PatchRequest),
    Sphere(SphereRequest),
}

/// Everything needed to build one chunk, as plain data. Live generators are
/// constructed from the params on whichever side executes the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub geometry: Geometry,
    pub heights: Vec<HeightFieldParams>,
    pub colors: ColorFieldParams,
}

impl BuildRequest {
    pub fn operation(&self) -> &'static str {
        match self.geometry {
            Geometry::Patch(_) => "build_patch",
            Geometry::Sphere(_) => "build_sphere_patch",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn execute(&self) -> Result<MeshData, BuildError> {
        let heights = HeightStack::from_params(&self.heights)?;
        let colors = ColorField::from_params(&self.colors)?;
        self.execute_with(&heights, &colors)
    }

    /// Builds against fields the caller already holds.
    pub fn execute_with(
        &self,
        heights: &HeightStack,
        colors: &ColorField,
    ) -> Result<MeshData, BuildError> {
        match &self.geometry {
            Geometry::Patch(patch) => build_patch(patch, heights, colors),
            Geometry::Sphere(sphere) => build_sphere_patch(sphere, heights, colors),
        }
    }
}

/// A [`BuildRequest`] encoded for the trip to a worker thread.
pub struct BuildJob {
    operation: &'static str,
    payload: Vec<u8>,
}

impl BuildJob {
    pub fn encode(request: &BuildRequest) -> Result<Self, BuildError> {
        Ok(Self {
            operation: request.operation(),
            payload: request.to_bytes()?,
        })
    }
}

impl Job for BuildJob {
    type Output = Result<MeshData, BuildError>;

    fn operation(&self) -> &str {
        self.operation
    }

    fn run(self) -> Self::Output {
        BuildRequest::from_bytes(&self.payload)?.execute()
    }
}
