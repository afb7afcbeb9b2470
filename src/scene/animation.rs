//! Clip playback.
//!
//! A clip is a set of keyframed channels, each driving one transform step
//! of one scene node. The mixer tracks which clip is active, where its
//! playhead is and how fast it advances. Models with clips auto-play the
//! first one.

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use super::graph::{StepTarget, TransformStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

/// Keyframe values, one per keyframe time.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyframes {
    Translations(Vec<Vec3>),
    Rotations(Vec<Quat>),
    Scales(Vec<Vec3>),
    /// Angles in radians for an [`TransformStep::AxisAngle`] step.
    Angles(Vec<f32>),
    /// Full matrices, pre-decomposed into scale, rotation and translation.
    Matrices(Vec<(Vec3, Quat, Vec3)>),
}

impl Keyframes {
    pub fn len(&self) -> usize {
        match self {
            Keyframes::Translations(v) | Keyframes::Scales(v) => v.len(),
            Keyframes::Rotations(v) => v.len(),
            Keyframes::Angles(v) => v.len(),
            Keyframes::Matrices(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub target: StepTarget,
    /// Ascending keyframe times in seconds.
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
    pub interpolation: Interpolation,
}

impl Channel {
    /// The step `current` replaced by the channel's value at `time`.
    /// Times outside the keyframes clamp to the first or last value.
    pub fn sample(&self, time: f32, current: &TransformStep) -> TransformStep {
        let count = self.times.len().min(self.keyframes.len());
        if count == 0 {
            return *current;
        }

        let next = self.times[..count].partition_point(|t| *t <= time);
        let (a, b, f) = if next == 0 {
            (0, 0, 0.0)
        } else if next >= count {
            (count - 1, count - 1, 0.0)
        } else {
            let (t0, t1) = (self.times[next - 1], self.times[next]);
            let f = match self.interpolation {
                Interpolation::Step => 0.0,
                Interpolation::Linear if t1 > t0 => (time - t0) / (t1 - t0),
                Interpolation::Linear => 0.0,
            };
            (next - 1, next, f)
        };

        match &self.keyframes {
            Keyframes::Translations(v) => TransformStep::Translate(v[a].lerp(v[b], f)),
            Keyframes::Rotations(v) => TransformStep::Rotate(v[a].slerp(v[b], f).normalize()),
            Keyframes::Scales(v) => TransformStep::Scale(v[a].lerp(v[b], f)),
            Keyframes::Angles(v) => {
                let angle = v[a] + (v[b] - v[a]) * f;
                match *current {
                    TransformStep::AxisAngle(axis, _) => TransformStep::AxisAngle(axis, angle),
                    _ => *current,
                }
            }
            Keyframes::Matrices(v) => {
                let (s0, r0, t0) = v[a];
                let (s1, r1, t1) = v[b];
                TransformStep::Matrix(Mat4::from_scale_rotation_translation(
                    s0.lerp(s1, f),
                    r0.slerp(r1, f).normalize(),
                    t0.lerp(t1, f),
                ))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    #[serde(skip)]
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration,
            channels: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    active: usize,
    time: f32,
    time_scale: f32,
}

impl AnimationMixer {
    /// Returns `None` when there is nothing to play.
    pub fn new(clips: Vec<AnimationClip>) -> Option<Self> {
        if clips.is_empty() {
            return None;
        }
        log::info!("Playing animation clip '{}'", clips[0].name);
        Some(Self {
            clips,
            active: 0,
            time: 0.0,
            time_scale: 1.0,
        })
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    pub fn active_clip(&self) -> &AnimationClip {
        &self.clips[self.active]
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    /// Playhead of the active clip, in `[0, duration)`.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advance the active clip, looping at its duration.
    pub fn update(&mut self, delta: f32) {
        let duration = self.clips[self.active].duration;
        if duration <= 0.0 || !duration.is_finite() {
            return;
        }
        self.time = (self.time + delta * self.time_scale).rem_euclid(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer(duration: f32) -> AnimationMixer {
        AnimationMixer::new(vec![
            AnimationClip::new("walk", duration),
            AnimationClip::new("run", 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_no_clips_no_mixer() {
        assert!(AnimationMixer::new(Vec::new()).is_none());
    }

    #[test]
    fn test_first_clip_auto_plays() {
        let m = mixer(2.0);
        assert_eq!(m.active_clip().name, "walk");
        assert_eq!(m.time_scale(), 1.0);
        assert_eq!(m.time(), 0.0);
    }

    #[test]
    fn test_update_wraps() {
        let mut m = mixer(2.0);
        m.update(1.5);
        assert!((m.time() - 1.5).abs() < 1e-6);
        m.update(1.0);
        assert!((m.time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_time_scale_and_reverse() {
        let mut m = mixer(2.0);
        m.set_time_scale(2.0);
        m.update(0.25);
        assert!((m.time() - 0.5).abs() < 1e-6);

        m.set_time_scale(-1.0);
        m.update(1.0);
        assert!((m.time() - 1.5).abs() < 1e-6);
    }

    fn translation_channel(interpolation: Interpolation) -> Channel {
        Channel {
            target: StepTarget { node: 0, step: 0 },
            times: vec![1.0, 3.0],
            keyframes: Keyframes::Translations(vec![Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0)]),
            interpolation,
        }
    }

    #[test]
    fn test_channel_interpolates_and_clamps() {
        let channel = translation_channel(Interpolation::Linear);
        let rest = TransformStep::Translate(Vec3::ONE);

        assert_eq!(channel.sample(0.0, &rest), TransformStep::Translate(Vec3::ZERO));
        assert_eq!(channel.sample(2.0, &rest), TransformStep::Translate(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(channel.sample(9.0, &rest), TransformStep::Translate(Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_step_interpolation_holds() {
        let channel = translation_channel(Interpolation::Step);
        let rest = TransformStep::Translate(Vec3::ONE);
        assert_eq!(channel.sample(2.9, &rest), TransformStep::Translate(Vec3::ZERO));
    }

    #[test]
    fn test_angle_channel_keeps_axis() {
        let channel = Channel {
            target: StepTarget { node: 0, step: 0 },
            times: vec![0.0, 2.0],
            keyframes: Keyframes::Angles(vec![0.0, 1.0]),
            interpolation: Interpolation::Linear,
        };
        let rest = TransformStep::AxisAngle(Vec3::Y, 0.25);
        assert_eq!(channel.sample(1.0, &rest), TransformStep::AxisAngle(Vec3::Y, 0.5));
    }

    #[test]
    fn test_zero_duration_is_frozen() {
        let mut m = mixer(0.0);
        m.update(1.0);
        assert_eq!(m.time(), 0.0);
    }
}
