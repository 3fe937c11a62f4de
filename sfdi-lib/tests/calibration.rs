// SPDX-License-Identifier: MPL-2.0

mod common;

use common::*;
use nalgebra::DMatrix;
use sfdi_lib::calibration::{CalibrationArtifact, CalibrationBuilder, Strategies};
use sfdi_lib::crop::Crop;
use sfdi_lib::phase::{NStepPhaseShift, PhaseShift, ReliabilityUnwrap};
use sfdi_lib::plan::{HeightSweep, PatternPlan};
use sfdi_lib::profilometry::{
    ClassicProfilometry, PolynomialProfilometry, Profilometry, ProfilometryModel,
};
use sfdi_lib::reconstruct::{reconstruct, Reconstructor};
use sfdi_lib::registry::{Registry, StrategySpec};
use sfdi_lib::repository::{ExperimentRepository, FileRepository, MemoryRepository};
use sfdi_lib::sequencer::CaptureSequencer;
use sfdi_lib::{Error, Result};
use std::cell::{Cell, RefCell};

fn plan(phases: usize) -> PatternPlan {
    PatternPlan::new(vec![16.0], PatternPlan::evenly_spaced_phases(phases), vec![0.0])
}

fn sweep() -> HeightSweep {
    HeightSweep::new(vec![0.0, 0.05, 0.10]).unwrap()
}

/// Phase shift counting its decodes.
struct CountingShift {
    inner: NStepPhaseShift,
    group_sizes: RefCell<Vec<usize>>,
}

impl PhaseShift for CountingShift {
    fn spec(&self) -> StrategySpec {
        self.inner.spec()
    }
    fn phase_count(&self) -> usize {
        self.inner.phase_count()
    }
    fn decode(&self, frames: &[DMatrix<f32>], shifts: &[f32]) -> Result<DMatrix<f32>> {
        self.group_sizes.borrow_mut().push(frames.len());
        self.inner.decode(frames, shifts)
    }
}

/// Profilometry counting its fits.
struct CountingProfilometry {
    inner: PolynomialProfilometry,
    fits: Cell<usize>,
    heights: Cell<usize>,
}

impl Profilometry for CountingProfilometry {
    fn spec(&self) -> StrategySpec {
        self.inner.spec()
    }
    fn needs_motor_stage(&self) -> bool {
        self.inner.needs_motor_stage()
    }
    fn fit(&self, heights: &[f32], phase_maps: &[Vec<DMatrix<f32>>]) -> Result<ProfilometryModel> {
        self.fits.set(self.fits.get() + 1);
        assert_eq!(heights.len(), phase_maps.len());
        self.heights.set(heights.len());
        self.inner.fit(heights, phase_maps)
    }
}

/// Calibrate on the virtual rig, subject hidden during the sweep.
fn calibrate_on_rig(
    scene: &SharedScene,
    repo: &mut dyn ExperimentRepository,
    name: &str,
    plan: &PatternPlan,
    sweep: &HeightSweep,
) -> Result<CalibrationArtifact> {
    let shift = NStepPhaseShift::new(plan.phases.len())?;
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = PolynomialProfilometry::new(1)?;
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let mut camera = VirtualCamera::gray(scene);
    let mut projector = VirtualProjector {
        scene: scene.clone(),
    };
    let mut stage = VirtualStage {
        scene: scene.clone(),
    };
    let mut guard = SubjectGuard {
        scene: scene.clone(),
    };
    let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector)
        .with_stage(&mut stage)
        .with_visibility(&mut guard);
    CalibrationBuilder::new(repo).calibrate(name, plan, Some(sweep), &mut sequencer, &strategies)
}

fn worst_error(heights: &DMatrix<f32>, expected: &DMatrix<f32>) -> f32 {
    heights
        .iter()
        .zip(expected.iter())
        .map(|(h, e)| (h - e).abs())
        .fold(0.0, f32::max)
}

fn capture_subject(scene: &SharedScene, plan: &PatternPlan) -> sfdi_lib::tensor::CaptureTensor {
    let mut camera = VirtualCamera::gray(scene);
    let mut projector = VirtualProjector {
        scene: scene.clone(),
    };
    CaptureSequencer::new(&mut camera, &mut projector)
        .acquire(plan, None)
        .unwrap()
}

#[test]
fn one_decode_per_height_and_a_single_fit() {
    let scene = flat_scene();
    let shift = CountingShift {
        inner: NStepPhaseShift::new(3).unwrap(),
        group_sizes: RefCell::new(Vec::new()),
    };
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = CountingProfilometry {
        inner: PolynomialProfilometry::new(2).unwrap(),
        fits: Cell::new(0),
        heights: Cell::new(0),
    };
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let mut camera = VirtualCamera::gray(&scene);
    let mut projector = VirtualProjector {
        scene: scene.clone(),
    };
    let mut stage = VirtualStage {
        scene: scene.clone(),
    };
    let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector).with_stage(&mut stage);
    let tensor = sequencer.acquire(&plan(3), Some(&sweep())).unwrap();
    assert_eq!(tensor.shape(), vec![3, 1, 3, 1]);

    let mut repo = MemoryRepository::default();
    CalibrationBuilder::new(&mut repo)
        .build("calib_A", &plan(3), Some(&sweep()), &tensor, &strategies)
        .unwrap();
    assert_eq!(*shift.group_sizes.borrow(), vec![3, 3, 3]);
    assert_eq!(prof.fits.get(), 1);
    assert_eq!(prof.heights.get(), 3);
}

#[test]
fn duplicate_names_are_rejected_before_any_capture() {
    let mut repo = MemoryRepository::default();
    calibrate_on_rig(&flat_scene(), &mut repo, "calib_A", &plan(3), &sweep()).unwrap();

    let scene = flat_scene();
    let result = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep());
    assert!(matches!(result, Err(Error::DuplicateCalibrationName(_))));
    assert_eq!(scene.borrow().count(&Event::Capture), 0);
    assert!(scene.borrow().events.is_empty());
}

#[test]
fn stage_strategies_without_stage_are_rejected_before_any_capture() {
    let scene = flat_scene();
    let shift = NStepPhaseShift::new(3).unwrap();
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = PolynomialProfilometry::new(1).unwrap();
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let mut camera = VirtualCamera::gray(&scene);
    let mut projector = VirtualProjector {
        scene: scene.clone(),
    };
    let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector);
    let mut repo = MemoryRepository::default();
    let result = CalibrationBuilder::new(&mut repo).calibrate(
        "no_stage",
        &plan(3),
        Some(&sweep()),
        &mut sequencer,
        &strategies,
    );
    assert!(matches!(result, Err(Error::MissingHardware(_))));
    assert!(scene.borrow().events.is_empty());
}

#[test]
fn saved_artifacts_load_back_identical() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = FileRepository::open(dir.path()).unwrap();
    let built = calibrate_on_rig(&flat_scene(), &mut repo, "calib_A", &plan(3), &sweep()).unwrap();

    let reopened = FileRepository::open(dir.path()).unwrap();
    assert_eq!(reopened.load("calib_A").unwrap(), built);
    assert_eq!(reopened.list().unwrap(), vec!["calib_A".to_string()]);
    assert_eq!(built.height_sweep(), Some(&sweep()));

    assert!(matches!(
        repo.save(&built),
        Err(Error::DuplicateCalibrationName(_))
    ));
    repo.delete("calib_A").unwrap();
    assert!(!repo.exists("calib_A").unwrap());
}

#[test]
fn reconstruction_recovers_the_subject() {
    let subject = bump(0.2);
    let scene = scene(subject.clone());
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep()).unwrap();
    assert!(scene.borrow().subject_visible);
    assert_eq!(scene.borrow().stage_height, 0.0);

    let tensor = capture_subject(&scene, &plan(3));
    let heights = reconstruct(&artifact, &tensor).unwrap();
    assert_eq!(heights.shape(), (ROWS, COLS));
    let worst = heights
        .iter()
        .zip(subject.iter())
        .map(|(h, s)| (h - s).abs())
        .fold(0.0, f32::max);
    assert!(worst < 1e-2, "max error {}", worst);

    let registry = Registry::default();
    let again = Reconstructor::new(&registry)
        .reconstruct(&artifact, &tensor)
        .unwrap();
    assert_eq!(heights, again);
}

#[test]
fn reconstruction_rejects_another_phase_count() {
    let scene = flat_scene();
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep()).unwrap();
    let tensor = capture_subject(&scene, &plan(4));
    assert!(matches!(
        reconstruct(&artifact, &tensor),
        Err(Error::IncompatiblePlan(_))
    ));
}

#[test]
fn classic_profilometry_needs_no_stage() {
    let scene = flat_scene();
    let shift = NStepPhaseShift::new(4).unwrap();
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = ClassicProfilometry::new(0.25, 0.2, 0.5).unwrap();
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let mut repo = MemoryRepository::default();
    let artifact = {
        let mut camera = VirtualCamera::gray(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector);
        CalibrationBuilder::new(&mut repo)
            .calibrate("classic", &plan(4), None, &mut sequencer, &strategies)
            .unwrap()
    };
    assert_eq!(artifact.height_sweep(), None);
    assert_eq!(artifact.profilometry_model().strategy(), "classic");

    let heights = reconstruct(&artifact, &capture_subject(&scene, &plan(4))).unwrap();
    assert!(heights.iter().all(|h| h.abs() < 1e-3));
}

#[test]
fn multiplexed_calibration_reconstructs() {
    let subject = bump(0.15);
    let scene = scene(subject.clone());
    let plan = PatternPlan::new(
        vec![16.0],
        PatternPlan::evenly_spaced_phases(3),
        vec![0.0, std::f32::consts::FRAC_PI_2],
    )
    .multiplexed(3);
    let shift = NStepPhaseShift::new(3).unwrap();
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = PolynomialProfilometry::new(1).unwrap();
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let mut repo = MemoryRepository::default();
    let artifact = {
        let mut camera = VirtualCamera::rgb(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        let mut stage = VirtualStage {
            scene: scene.clone(),
        };
        let mut guard = SubjectGuard {
            scene: scene.clone(),
        };
        let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector)
            .with_stage(&mut stage)
            .with_visibility(&mut guard);
        CalibrationBuilder::new(&mut repo)
            .calibrate("rgb", &plan, Some(&sweep()), &mut sequencer, &strategies)
            .unwrap()
    };
    // One RGB frame per group and height.
    assert_eq!(scene.borrow().count(&Event::Capture), 2 * 3);

    let tensor = {
        let mut camera = VirtualCamera::rgb(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        CaptureSequencer::new(&mut camera, &mut projector)
            .acquire(&plan, None)
            .unwrap()
    };
    let heights = reconstruct(&artifact, &tensor).unwrap();
    let worst = heights
        .iter()
        .zip(subject.iter())
        .map(|(h, s)| (h - s).abs())
        .fold(0.0, f32::max);
    assert!(worst < 1e-2, "max error {}", worst);
}

#[test]
fn subjects_high_in_a_long_sweep_keep_their_height() {
    // 10 rad per unit height, the sweep covers 5 rad.
    let long_sweep = HeightSweep::new(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
    let scene = flat_scene();
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "long", &plan(3), &long_sweep).unwrap();

    for &height in &[0.05, 0.3, 0.45] {
        scene.borrow_mut().stage_height = height;
        let heights = reconstruct(&artifact, &capture_subject(&scene, &plan(3))).unwrap();
        let expected = DMatrix::repeat(ROWS, COLS, height);
        let worst = worst_error(&heights, &expected);
        assert!(worst < 1e-2, "height {}: max error {}", height, worst);
    }
}

#[test]
fn uneven_phase_offsets_reconstruct() {
    let subject = bump(0.2);
    let scene = scene(subject.clone());
    let uneven = PatternPlan::new(vec![16.0], vec![0.0, 0.5, 1.0], vec![0.0]);
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "uneven", &uneven, &sweep()).unwrap();
    let heights = reconstruct(&artifact, &capture_subject(&scene, &uneven)).unwrap();
    let worst = worst_error(&heights, &subject);
    assert!(worst < 1e-2, "max error {}", worst);
}

#[test]
fn cropped_calibration_reconstructs_cropped_captures() {
    let subject = bump(0.2);
    let scene = scene(subject.clone());
    let crop = Crop::centered(32, 16, (ROWS, COLS)).unwrap();
    let shift = NStepPhaseShift::new(3).unwrap();
    let unwrap = ReliabilityUnwrap::new(false);
    let prof = PolynomialProfilometry::new(1).unwrap();
    let strategies = Strategies {
        phase_shift: &shift,
        phase_unwrap: &unwrap,
        profilometry: &prof,
    };
    let reference = {
        let mut camera = VirtualCamera::gray(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        let mut stage = VirtualStage {
            scene: scene.clone(),
        };
        let mut guard = SubjectGuard {
            scene: scene.clone(),
        };
        CaptureSequencer::new(&mut camera, &mut projector)
            .with_stage(&mut stage)
            .with_visibility(&mut guard)
            .acquire(&plan(3), Some(&sweep()))
            .unwrap()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut repo = FileRepository::open(dir.path()).unwrap();
    CalibrationBuilder::new(&mut repo)
        .with_crop(Some(crop))
        .build("cropped", &plan(3), Some(&sweep()), &reference.crop(&crop).unwrap(), &strategies)
        .unwrap();

    let artifact = repo.load("cropped").unwrap();
    let full = capture_subject(&scene, &plan(3));
    assert!(matches!(
        reconstruct(&artifact, &full),
        Err(Error::IncompatiblePlan(_))
    ));
    let stored = artifact.crop().unwrap();
    let heights = reconstruct(&artifact, &full.crop(&stored).unwrap()).unwrap();
    assert_eq!(heights.shape(), (16, 32));
    let worst = worst_error(&heights, &sfdi_lib::crop::crop(stored, &subject).unwrap());
    assert!(worst < 1e-2, "max error {}", worst);
}

#[test]
fn reconstruction_rejects_swept_captures() {
    let scene = flat_scene();
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep()).unwrap();
    let swept = {
        let mut camera = VirtualCamera::gray(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        let mut stage = VirtualStage {
            scene: scene.clone(),
        };
        CaptureSequencer::new(&mut camera, &mut projector)
            .with_stage(&mut stage)
            .acquire(&plan(3), Some(&sweep()))
            .unwrap()
    };
    assert!(matches!(
        reconstruct(&artifact, &swept),
        Err(Error::IncompatiblePlan(_))
    ));
}

#[test]
fn reconstruction_rejects_another_multiplexing() {
    let scene = flat_scene();
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep()).unwrap();
    let multiplexed = plan(3).multiplexed(3);
    let tensor = {
        let mut camera = VirtualCamera::rgb(&scene);
        let mut projector = VirtualProjector {
            scene: scene.clone(),
        };
        CaptureSequencer::new(&mut camera, &mut projector)
            .acquire(&multiplexed, None)
            .unwrap()
    };
    assert_eq!(tensor.resolution(), (ROWS, COLS));
    assert!(matches!(
        reconstruct(&artifact, &tensor),
        Err(Error::IncompatiblePlan(_))
    ));
}

#[test]
fn reconstruction_rejects_another_resolution() {
    let scene = flat_scene();
    let mut repo = MemoryRepository::default();
    let artifact = calibrate_on_rig(&scene, &mut repo, "calib_A", &plan(3), &sweep()).unwrap();
    let crop = Crop::centered(COLS - 2, ROWS, (ROWS, COLS)).unwrap();
    let tensor = capture_subject(&scene, &plan(3)).crop(&crop).unwrap();
    assert!(matches!(
        reconstruct(&artifact, &tensor),
        Err(Error::IncompatiblePlan(_))
    ));
}
