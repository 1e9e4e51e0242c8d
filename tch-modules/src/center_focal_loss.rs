use crate::common::*;

/// Penalty-reduced focal loss initializer.
#[derive(Debug, Clone)]
pub struct CenterFocalLossInit {
    /// The focusing exponent applied on prediction probabilities.
    pub alpha: f64,
    /// The exponent reducing the penalty of negatives near a peak.
    pub beta: f64,
    /// Target values at or above this threshold count as peaks.
    pub pos_threshold: f64,
    /// Probabilities are clamped into `[clamp_eps, 1 - clamp_eps]` before taking logarithms.
    pub clamp_eps: f64,
}

impl Default for CenterFocalLossInit {
    fn default() -> Self {
        Self {
            alpha: 2.0,
            beta: 4.0,
            pos_threshold: 1.0 - 1e-6,
            clamp_eps: 1e-4,
        }
    }
}

impl CenterFocalLossInit {
    pub fn build(self) -> Result<CenterFocalLoss> {
        let Self {
            alpha,
            beta,
            pos_threshold,
            clamp_eps,
        } = self;

        ensure!(alpha >= 0.0, "alpha must be non-negative, but get {}", alpha);
        ensure!(beta >= 0.0, "beta must be non-negative, but get {}", beta);
        ensure!(
            (0.0..=1.0).contains(&pos_threshold),
            "pos_threshold must be in range [0, 1], but get {}",
            pos_threshold
        );
        ensure!(
            clamp_eps > 0.0 && clamp_eps < 0.5,
            "clamp_eps must be in range (0, 0.5), but get {}",
            clamp_eps
        );

        Ok(CenterFocalLoss {
            alpha,
            beta,
            pos_threshold,
            clamp_eps,
        })
    }
}

/// Focal loss on gaussian-splatted center heatmaps.
///
/// Peak cells contribute `-(1 - p)^alpha * log(p)`. Every other cell contributes
/// `-(1 - y)^beta * p^alpha * log(1 - p)`, where `y` is the target value. The sum is
/// normalized by the number of peaks, or by 1 if there is none.
#[derive(Debug)]
pub struct CenterFocalLoss {
    alpha: f64,
    beta: f64,
    pos_threshold: f64,
    clamp_eps: f64,
}

impl CenterFocalLoss {
    /// Compute the loss from heatmap logits against a target heatmap of the same shape.
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Result<Tensor> {
        let Self {
            alpha,
            beta,
            pos_threshold,
            clamp_eps,
        } = *self;

        ensure!(
            input.size() == target.size(),
            "input and target shape must be equal, but get {:?} and {:?}",
            input.size(),
            target.size()
        );

        if input.is_empty() {
            return Ok(Tensor::zeros(&[], (Kind::Float, input.device())));
        }

        let prob = input
            .sigmoid()
            .clamp_min(clamp_eps)
            .clamp_max(1.0 - clamp_eps);
        let pos_mask = target.ge(pos_threshold).to_kind(Kind::Float);
        let neg_mask = target.lt(pos_threshold).to_kind(Kind::Float);
        let neg_weight = (1.0f64 - target).pow_tensor_scalar(beta);

        let pos_loss = prob.log() * (1.0f64 - &prob).pow_tensor_scalar(alpha) * &pos_mask;
        let neg_loss =
            (1.0f64 - &prob).log() * prob.pow_tensor_scalar(alpha) * neg_weight * &neg_mask;

        let num_pos = pos_mask.sum(Kind::Float).clamp_min(1.0);
        let loss = -(pos_loss.sum(Kind::Float) + neg_loss.sum(Kind::Float)) / num_pos;
        Ok(loss)
    }
}
