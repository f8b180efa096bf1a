use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Rotación de `angle` radianes alrededor de un eje (se normaliza)
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Self {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2])
            .sqrt()
            .max(1e-9);
        let half = angle / 2.0;
        let s = half.sin() / norm;
        Self::new(half.cos(), axis[0] * s, axis[1] * s, axis[2] * s)
    }

    pub fn about_x(angle: f32) -> Self {
        Self::from_axis_angle([1.0, 0.0, 0.0], angle)
    }

    pub fn about_y(angle: f32) -> Self {
        Self::from_axis_angle([0.0, 1.0, 0.0], angle)
    }

    pub fn about_z(angle: f32) -> Self {
        Self::from_axis_angle([0.0, 0.0, 1.0], angle)
    }

    pub fn normalized(self) -> Self {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z)
            .sqrt()
            .max(1e-9);

        Self {
            w: self.w / norm,
            x: self.x / norm,
            y: self.y / norm,
            z: self.z / norm,
        }
    }

    pub fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }

    /// Ángulo total de la rotación, en [0, π]
    pub fn angle(self) -> f32 {
        let q = self.normalized();
        2.0 * q.w.abs().clamp(0.0, 1.0).acos()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}
