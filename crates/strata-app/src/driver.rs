//! Stand-ins for the renderer: a camera-distance visibility graph and a
//! preparer that counts exposed faces instead of building vertex buffers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use glam::{IVec2, IVec3};
use strata_mesh::{InterruptFlag, MeshQueueItem, PrepareError, SectionPreparer, VisibilityGraph};
use strata_voxel::{FaceDirection, SECTION_WIDTH, SectionWorld, local_index};

/// Everything within `view_distance` chunks of the camera is in view.
///
/// Strict section queries also hide sections below the camera whose upper
/// neighbor is sealed top to bottom. They only try-lock the world and count
/// the section as visible when it is busy.
pub struct DistanceVisibility {
    world: Arc<RwLock<SectionWorld>>,
    camera: Mutex<IVec3>,
    view_distance: i32,
}

impl DistanceVisibility {
    /// Creates a graph over `world` with the camera at the origin section.
    pub fn new(world: Arc<RwLock<SectionWorld>>, view_distance: u32) -> Self {
        Self {
            world,
            camera: Mutex::new(IVec3::ZERO),
            view_distance: i32::try_from(view_distance).unwrap_or(i32::MAX),
        }
    }

    /// Moves the camera to a section-grid position.
    pub fn set_camera(&self, section_position: IVec3) {
        *self.camera.lock().unwrap_or_else(PoisonError::into_inner) = section_position;
    }

    fn camera(&self) -> IVec3 {
        *self.camera.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buried(&self, chunk: IVec2, height: i32, camera: IVec3) -> bool {
        if height >= camera.y || chunk == IVec2::new(camera.x, camera.z) {
            return false;
        }
        let Ok(world) = self.world.try_read() else {
            return false;
        };
        world
            .section(chunk, height + 1)
            .is_some_and(|above| above.is_occluded(FaceDirection::PosY, FaceDirection::NegY))
    }
}

impl VisibilityGraph for DistanceVisibility {
    fn is_chunk_visible(&self, chunk: IVec2) -> bool {
        let camera = self.camera();
        let offset = chunk - IVec2::new(camera.x, camera.z);
        offset.x.abs().max(offset.y.abs()) <= self.view_distance
    }

    fn is_section_visible(
        &self,
        chunk: IVec2,
        height: i32,
        _min: IVec3,
        _max: IVec3,
        strict: bool,
    ) -> bool {
        if !self.is_chunk_visible(chunk) {
            return false;
        }
        let camera = self.camera();
        if (height - camera.y).abs() > self.view_distance {
            return false;
        }
        !(strict && self.buried(chunk, height, camera))
    }
}

/// Counts the exposed opaque faces of a section snapshot as its "mesh".
///
/// Finished meshes wait in an upload counter that the frame loop drains.
pub struct CountingPreparer {
    world: Arc<RwLock<SectionWorld>>,
    finished: AtomicUsize,
    prepared: AtomicU64,
    faces: AtomicU64,
}

impl CountingPreparer {
    /// Creates a preparer that snapshots sections out of `world`.
    pub fn new(world: Arc<RwLock<SectionWorld>>) -> Self {
        Self {
            world,
            finished: AtomicUsize::new(0),
            prepared: AtomicU64::new(0),
            faces: AtomicU64::new(0),
        }
    }

    /// Takes up to `max` finished meshes off the upload backlog.
    pub fn upload(&self, max: usize) -> usize {
        let previous = self
            .finished
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |waiting| {
                Some(waiting - waiting.min(max))
            })
            .unwrap_or_else(|waiting| waiting);
        previous.min(max)
    }

    /// Sections prepared so far.
    pub fn prepared(&self) -> u64 {
        self.prepared.load(Ordering::Relaxed)
    }

    /// Exposed faces counted so far.
    pub fn faces(&self) -> u64 {
        self.faces.load(Ordering::Relaxed)
    }
}

impl SectionPreparer for CountingPreparer {
    fn prepare(&self, item: &MeshQueueItem, interrupt: &InterruptFlag) -> Result<(), PrepareError> {
        let (cells, registry) = {
            let world = self.world.read().unwrap_or_else(PoisonError::into_inner);
            let section = world
                .section(item.chunk, item.height)
                .ok_or(PrepareError::SectionMissing(*item))?;
            let cells = section
                .copy_cells()
                .ok_or(PrepareError::SectionMissing(*item))?;
            (cells, Arc::clone(section.registry()))
        };

        let width = SECTION_WIDTH as i32;
        let mut faces = 0u64;
        for y in 0..width {
            if interrupt.is_set() {
                return Err(PrepareError::Interrupted);
            }
            for z in 0..width {
                for x in 0..width {
                    let cell = cells[local_index(x as usize, y as usize, z as usize)];
                    if !registry.is_fully_opaque(cell) {
                        continue;
                    }
                    for face in FaceDirection::ALL {
                        let (nx, ny, nz) = face.offset(x, y, z);
                        let inside = [nx, ny, nz].iter().all(|c| (0..width).contains(c));
                        if !inside
                            || !registry.is_fully_opaque(
                                cells[local_index(nx as usize, ny as usize, nz as usize)],
                            )
                        {
                            faces += 1;
                        }
                    }
                }
            }
        }

        self.faces.fetch_add(faces, Ordering::Relaxed);
        self.prepared.fetch_add(1, Ordering::Relaxed);
        self.finished.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn meshes_to_load(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }
}
