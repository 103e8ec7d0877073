//! The flexible value type passed between value-producing nodes.
//!
//! Every value-producing node returns a [`FlexValue`] regardless of its
//! natural arity; consumers project it to whatever shape they need. All
//! conversions are defined and lossy: scalars broadcast to every vector
//! lane, vectors narrow by dropping trailing lanes and widen by
//! zero-padding, and strings map to 1.0/0.0 by non-empty/empty.

use glam::{Vec2, Vec3, Vec4};

/// A tagged scalar/vector/string value with cross-arity conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum FlexValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Str(String),
}

impl FlexValue {
    /// Scalar projection: the first lane of a vector, 1.0/0.0 for strings.
    pub fn as_float(&self) -> f32 {
        match self {
            FlexValue::Float(a) => *a,
            FlexValue::Vec2(a) => a.x,
            FlexValue::Vec3(a) => a.x,
            FlexValue::Vec4(a) => a.x,
            FlexValue::Str(s) => {
                if s.is_empty() {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    pub fn as_vec2(&self) -> Vec2 {
        match self {
            FlexValue::Float(a) => Vec2::splat(*a),
            FlexValue::Vec2(a) => *a,
            FlexValue::Vec3(a) => Vec2::new(a.x, a.y),
            FlexValue::Vec4(a) => Vec2::new(a.x, a.y),
            FlexValue::Str(_) => Vec2::splat(self.as_float()),
        }
    }

    pub fn as_vec3(&self) -> Vec3 {
        match self {
            FlexValue::Float(a) => Vec3::splat(*a),
            FlexValue::Vec2(a) => Vec3::new(a.x, a.y, 0.0),
            FlexValue::Vec3(a) => *a,
            FlexValue::Vec4(a) => Vec3::new(a.x, a.y, a.z),
            FlexValue::Str(_) => Vec3::splat(self.as_float()),
        }
    }

    pub fn as_vec4(&self) -> Vec4 {
        match self {
            FlexValue::Float(a) => Vec4::splat(*a),
            FlexValue::Vec2(a) => Vec4::new(a.x, a.y, 0.0, 0.0),
            FlexValue::Vec3(a) => Vec4::new(a.x, a.y, a.z, 0.0),
            FlexValue::Vec4(a) => *a,
            FlexValue::Str(_) => Vec4::splat(self.as_float()),
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            FlexValue::Float(a) => a.to_string(),
            FlexValue::Vec2(a) => a.to_string(),
            FlexValue::Vec3(a) => a.to_string(),
            FlexValue::Vec4(a) => a.to_string(),
            FlexValue::Str(s) => s.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_broadcasts() {
        let v = FlexValue::Float(2.5);
        assert_eq!(v.as_vec2(), Vec2::splat(2.5));
        assert_eq!(v.as_vec3(), Vec3::splat(2.5));
        assert_eq!(v.as_vec4(), Vec4::splat(2.5));
    }

    #[test]
    fn test_vector_narrows_and_widens() {
        let v = FlexValue::Vec3(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.as_float(), 1.0);
        assert_eq!(v.as_vec2(), Vec2::new(1.0, 2.0));
        assert_eq!(v.as_vec4(), Vec4::new(1.0, 2.0, 3.0, 0.0));

        let v = FlexValue::Vec2(Vec2::new(4.0, 5.0));
        assert_eq!(v.as_vec4(), Vec4::new(4.0, 5.0, 0.0, 0.0));
    }

    #[test]
    fn test_string_by_emptiness() {
        assert_eq!(FlexValue::Str(String::new()).as_float(), 0.0);
        assert_eq!(FlexValue::Str("x".into()).as_float(), 1.0);
        assert_eq!(FlexValue::Str("x".into()).as_vec3(), Vec3::ONE);
    }
}
