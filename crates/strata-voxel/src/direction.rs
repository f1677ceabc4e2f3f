//! Cardinal directions for section geometry: face (6), edge (12), and corner (8),
//! plus the 15 unordered face pairs the occlusion engine answers queries for.

/// One of the six axis-aligned faces of a section.
///
/// The `repr(u8)` discriminant is the face ordinal used by [`face_pair_index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FaceDirection {
    PosX = 0,
    NegX = 1,
    PosY = 2,
    NegY = 3,
    PosZ = 4,
    NegZ = 5,
}

/// Number of unordered pairs of distinct faces (6 choose 2).
pub const FACE_PAIR_COUNT: usize = 15;

/// Every unordered pair of distinct faces, ordered by `(a, b)` with `a < b`.
///
/// The position of a pair in this table is its [`face_pair_index`].
pub const FACE_PAIRS: [(FaceDirection, FaceDirection); FACE_PAIR_COUNT] = [
    (FaceDirection::PosX, FaceDirection::NegX),
    (FaceDirection::PosX, FaceDirection::PosY),
    (FaceDirection::PosX, FaceDirection::NegY),
    (FaceDirection::PosX, FaceDirection::PosZ),
    (FaceDirection::PosX, FaceDirection::NegZ),
    (FaceDirection::NegX, FaceDirection::PosY),
    (FaceDirection::NegX, FaceDirection::NegY),
    (FaceDirection::NegX, FaceDirection::PosZ),
    (FaceDirection::NegX, FaceDirection::NegZ),
    (FaceDirection::PosY, FaceDirection::NegY),
    (FaceDirection::PosY, FaceDirection::PosZ),
    (FaceDirection::PosY, FaceDirection::NegZ),
    (FaceDirection::NegY, FaceDirection::PosZ),
    (FaceDirection::NegY, FaceDirection::NegZ),
    (FaceDirection::PosZ, FaceDirection::NegZ),
];

/// Returns the slot of the unordered pair `{a, b}` in [`FACE_PAIRS`].
///
/// Symmetric in its arguments. Returns `None` when `a == b`, since a face is
/// never separated from itself.
pub fn face_pair_index(a: FaceDirection, b: FaceDirection) -> Option<usize> {
    let (lo, hi) = match a.index().cmp(&b.index()) {
        std::cmp::Ordering::Less => (a.index(), b.index()),
        std::cmp::Ordering::Greater => (b.index(), a.index()),
        std::cmp::Ordering::Equal => return None,
    };
    // Rows shrink by one per face: row `lo` starts after 5 + 4 + ... entries.
    Some(lo * (11 - lo) / 2 + (hi - lo - 1))
}

impl FaceDirection {
    /// Faces in ordinal order.
    pub const ALL: [FaceDirection; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    /// Returns the axis this face is perpendicular to (0=X, 1=Y, 2=Z).
    pub fn axis(self) -> usize {
        match self {
            Self::PosX | Self::NegX => 0,
            Self::PosY | Self::NegY => 1,
            Self::PosZ | Self::NegZ => 2,
        }
    }

    /// Returns `true` for the faces pointing along a positive axis.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::PosX | Self::PosY | Self::PosZ)
    }

    /// Unit step `(dx, dy, dz)` across this face.
    pub fn vector(self) -> (i32, i32, i32) {
        let sign = if self.is_positive() { 1 } else { -1 };
        match self.axis() {
            0 => (sign, 0, 0),
            1 => (0, sign, 0),
            _ => (0, 0, sign),
        }
    }

    /// Cell next to `(x, y, z)` across this face.
    pub fn offset(self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        let (dx, dy, dz) = self.vector();
        (x + dx, y + dy, z + dz)
    }

    /// The face on the other side of the section.
    pub fn opposite(self) -> Self {
        // Faces come in (positive, negative) ordinal pairs.
        Self::ALL[self.index() ^ 1]
    }

    /// Face ordinal, `0..6`.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Diagonal step across one of the 12 section edges.
///
/// Variants name the two faces the edge joins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EdgeDirection {
    PosXPosY = 0,
    PosXNegY = 1,
    PosXPosZ = 2,
    PosXNegZ = 3,
    NegXPosY = 4,
    NegXNegY = 5,
    NegXPosZ = 6,
    NegXNegZ = 7,
    PosYPosZ = 8,
    PosYNegZ = 9,
    NegYPosZ = 10,
    NegYNegZ = 11,
}

impl EdgeDirection {
    pub const ALL: [EdgeDirection; 12] = [
        Self::PosXPosY,
        Self::PosXNegY,
        Self::PosXPosZ,
        Self::PosXNegZ,
        Self::NegXPosY,
        Self::NegXNegY,
        Self::NegXPosZ,
        Self::NegXNegZ,
        Self::PosYPosZ,
        Self::PosYNegZ,
        Self::NegYPosZ,
        Self::NegYNegZ,
    ];

    pub fn vector(self) -> (i32, i32, i32) {
        match self {
            Self::PosXPosY => (1, 1, 0),
            Self::PosXNegY => (1, -1, 0),
            Self::PosXPosZ => (1, 0, 1),
            Self::PosXNegZ => (1, 0, -1),
            Self::NegXPosY => (-1, 1, 0),
            Self::NegXNegY => (-1, -1, 0),
            Self::NegXPosZ => (-1, 0, 1),
            Self::NegXNegZ => (-1, 0, -1),
            Self::PosYPosZ => (0, 1, 1),
            Self::PosYNegZ => (0, 1, -1),
            Self::NegYPosZ => (0, -1, 1),
            Self::NegYNegZ => (0, -1, -1),
        }
    }
}

/// Diagonal step across one of the 8 section corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CornerDirection {
    NegXNegYNegZ = 0,
    PosXNegYNegZ = 1,
    NegXPosYNegZ = 2,
    PosXPosYNegZ = 3,
    NegXNegYPosZ = 4,
    PosXNegYPosZ = 5,
    NegXPosYPosZ = 6,
    PosXPosYPosZ = 7,
}

impl CornerDirection {
    pub const ALL: [CornerDirection; 8] = [
        Self::NegXNegYNegZ,
        Self::PosXNegYNegZ,
        Self::NegXPosYNegZ,
        Self::PosXPosYNegZ,
        Self::NegXNegYPosZ,
        Self::PosXNegYPosZ,
        Self::NegXPosYPosZ,
        Self::PosXPosYPosZ,
    ];

    /// Bit 0 of the discriminant selects +X, bit 1 +Y and bit 2 +Z.
    pub fn vector(self) -> (i32, i32, i32) {
        let bits = self as u8;
        let step = |bit: u8| if bits & bit != 0 { 1 } else { -1 };
        (step(1), step(2), step(4))
    }
}

/// Every neighbor step around a section: 6 faces, then 12 edges, then 8 corners.
pub fn neighbor_offsets() -> impl Iterator<Item = (i32, i32, i32)> {
    FaceDirection::ALL
        .into_iter()
        .map(FaceDirection::vector)
        .chain(EdgeDirection::ALL.into_iter().map(EdgeDirection::vector))
        .chain(CornerDirection::ALL.into_iter().map(CornerDirection::vector))
}
