// ============================================================
// Layer 5 - Step Function
// ============================================================
// One function runs a single batch in either mode:
//
//   Train: forward → sigmoid → Dice loss → log → backward → Adam
//   Eval:  forward → sigmoid → Dice loss → log
//
// The step counter lives in an explicit TrainState passed in by
// the epoch driver. Only a Train step advances it; both modes log
// at its current value.
//
// Batches arrive on the inner (non-autodiff) backend. Train mode
// lifts them onto the autodiff graph with Tensor::from_inner; Eval
// mode runs model.valid() and never builds a graph.
//
// Reference: Burn Book §5 (Custom Training Loop)

use anyhow::{anyhow, Result};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};
use image::RgbImage;

use crate::data::batcher::SliceBatch;
use crate::domain::traits::MetricSink;
use crate::infra::overlay::render_side_by_side;
use crate::ml::dice::dice_loss;
use crate::ml::model::SegmentationModel;

/// Which half of an epoch a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Train,
    Eval,
}

impl StepMode {
    /// Metric channel the per-batch Dice loss is logged under.
    pub fn channel(self) -> &'static str {
        match self {
            StepMode::Train => "Train Dice",
            StepMode::Eval  => "Val Dice",
        }
    }

    /// Channel for the visual sample artifact.
    pub fn sample_channel(self) -> &'static str {
        match self {
            StepMode::Train => "Train Sample",
            StepMode::Eval  => "Val Sample",
        }
    }
}

/// Mutable training progress shared by all steps of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainState {
    /// 1-based; 0 before the first epoch starts
    pub epoch: usize,

    /// Number of optimizer updates applied so far
    pub global_step: u64,
}

/// How often a visual sample is emitted, in batches. 0 disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCadence {
    pub train_every: usize,
    pub val_every:   usize,
}

impl Default for SampleCadence {
    fn default() -> Self {
        Self { train_every: 50, val_every: 2 }
    }
}

impl SampleCadence {
    pub fn is_due(&self, mode: StepMode, batch_idx: usize) -> bool {
        let every = match mode {
            StepMode::Train => self.train_every,
            StepMode::Eval  => self.val_every,
        };
        every > 0 && batch_idx % every == 0
    }
}

/// Everything a step needs besides the model, optimizer and batch.
pub struct StepContext<'a, S: MetricSink + ?Sized> {
    pub state:   &'a mut TrainState,
    pub sink:    &'a mut S,
    pub cadence: SampleCadence,
}

/// Run one batch and return the (possibly updated) model with the
/// batch's Dice loss.
///
/// `batch_idx` is the position of the batch within the current epoch
/// phase and only drives the sample cadence.
pub fn run_step<B, M, O, S>(
    ctx:       &mut StepContext<'_, S>,
    mode:      StepMode,
    model:     M,
    optim:     &mut O,
    lr:        f64,
    batch_idx: usize,
    batch:     SliceBatch<B::InnerBackend>,
) -> Result<(M, f64)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
    S: MetricSink + ?Sized,
{
    let images = batch.images;
    let masks  = batch.masks.float();

    match mode {
        StepMode::Train => {
            let probs = sigmoid(model.forward(Tensor::<B, 4>::from_inner(images.clone())));
            let loss  = dice_loss(probs.clone(), Tensor::<B, 4>::from_inner(masks.clone()))?;
            let value = loss.clone().into_scalar().elem::<f64>();

            report(ctx, mode, batch_idx, value, &images, &masks, &probs.inner());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            let model = optim.step(lr, model, grads);
            ctx.state.global_step += 1;
            Ok((model, value))
        }
        StepMode::Eval => {
            let probs = sigmoid(model.valid().forward(images.clone()));
            let loss  = dice_loss(probs.clone(), masks.clone())?;
            let value = loss.into_scalar().elem::<f64>();

            report(ctx, mode, batch_idx, value, &images, &masks, &probs);
            Ok((model, value))
        }
    }
}

// Sink failures are logged and swallowed; training must not stop
// because a log file could not be written.
fn report<B: Backend, S: MetricSink + ?Sized>(
    ctx:       &mut StepContext<'_, S>,
    mode:      StepMode,
    batch_idx: usize,
    value:     f64,
    images:    &Tensor<B, 4>,
    masks:     &Tensor<B, 4>,
    probs:     &Tensor<B, 4>,
) {
    let step = ctx.state.global_step;
    if let Err(e) = ctx.sink.log_scalar(mode.channel(), value, step) {
        tracing::warn!("Could not log '{}' at step {}: {e:#}", mode.channel(), step);
    }

    if !ctx.cadence.is_due(mode, batch_idx) {
        return;
    }
    let logged = first_sample(images, masks, probs)
        .and_then(|img| ctx.sink.log_image(mode.sample_channel(), &img, step));
    if let Err(e) = logged {
        tracing::warn!("Could not log '{}' at step {}: {e:#}", mode.sample_channel(), step);
    }
}

/// Side-by-side rendering of the first slice in the batch.
fn first_sample<B: Backend>(
    images: &Tensor<B, 4>,
    masks:  &Tensor<B, 4>,
    probs:  &Tensor<B, 4>,
) -> Result<RgbImage> {
    let [_, _, height, width] = images.dims();
    let first = |t: &Tensor<B, 4>| -> Result<Vec<f32>> {
        t.clone()
            .slice([0..1, 0..1, 0..height, 0..width])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))
    };

    Ok(render_side_by_side(
        &first(images)?,
        &first(masks)?,
        &first(probs)?,
        width as u32,
        height as u32,
    ))
}
