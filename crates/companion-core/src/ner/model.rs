//! # Entity Scoring Network
//!
//! A small candle network scores every BIO tag for every token, and a
//! learned transition table scores consecutive tag pairs:
//!
//! ```text
//! feature ids -> embedding rows -> sum -> tanh -> Linear -> emissions [seq, tags]
//! ```
//!
//! Training minimises the negative log-likelihood of the gold sequence
//! under a linear-chain CRF with plain SGD. Transitions the BIO scheme
//! forbids are masked out of the partition function, matching what the
//! Viterbi decoder is allowed to produce.

use std::fmt;
use std::path::Path;

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Init, Linear, Module, Optimizer, SGD, VarBuilder, VarMap};
use rand::Rng;
use rand::rngs::StdRng;

use crate::nlp::bio_tags::BioTag;

/// Width of the hidden layer.
pub const HIDDEN_SIZE: usize = 32;

/// SGD step size.
pub const LEARNING_RATE: f64 = 0.1;

/// Initial weights are drawn from `[-INIT_RANGE, INIT_RANGE)`.
const INIT_RANGE: f32 = 0.3;

/// Score of a transition the BIO scheme forbids.
const FORBIDDEN: f32 = -1e4;

/// Emission network plus CRF transitions for `num_tags` tags.
pub struct NerModel {
    varmap: VarMap,
    embeddings: Tensor,
    emission: Linear,
    /// Indexed `[prev][curr]`.
    transitions: Tensor,
    transition_mask: Tensor,
    start_mask: Tensor,
    optimizer: SGD,
    vocab_size: usize,
    num_tags: usize,
    device: Device,
}

impl NerModel {
    /// A model with all weights zero. Call [`NerModel::init_weights`]
    /// before training or [`NerModel::load`] to restore saved weights.
    pub fn new(vocab_size: usize, num_tags: usize) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let embeddings = vb.pp("embeddings").get_with_hints(
            (vocab_size.max(1), HIDDEN_SIZE),
            "weight",
            Init::Const(0.0),
        )?;
        let emission = Linear::new(
            vb.pp("emission")
                .get_with_hints((num_tags, HIDDEN_SIZE), "weight", Init::Const(0.0))?,
            Some(
                vb.pp("emission")
                    .get_with_hints(num_tags, "bias", Init::Const(0.0))?,
            ),
        );
        let transitions =
            vb.get_with_hints((num_tags, num_tags), "transitions", Init::Const(0.0))?;

        let mut mask = vec![0f32; num_tags * num_tags];
        for prev in 0..num_tags {
            for curr in 0..num_tags {
                if !BioTag::is_valid_transition(BioTag::from_index(prev), BioTag::from_index(curr))
                {
                    mask[prev * num_tags + curr] = FORBIDDEN;
                }
            }
        }
        let transition_mask = Tensor::from_vec(mask, (num_tags, num_tags), &device)?;
        let start: Vec<f32> = (0..num_tags)
            .map(|tag| {
                if BioTag::from_index(tag).is_valid_start() {
                    0.0
                } else {
                    FORBIDDEN
                }
            })
            .collect();
        let start_mask = Tensor::from_vec(start, num_tags, &device)?;

        let optimizer = SGD::new(varmap.all_vars(), LEARNING_RATE)?;

        Ok(Self {
            varmap,
            embeddings,
            emission,
            transitions,
            transition_mask,
            start_mask,
            optimizer,
            vocab_size,
            num_tags,
            device,
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Draw the embedding and emission weights from `rng`. Biases and
    /// transitions stay zero.
    pub fn init_weights(&mut self, rng: &mut StdRng) -> Result<()> {
        let mut uniform = |rows: usize, cols: usize| {
            let values: Vec<f32> = (0..rows * cols)
                .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
                .collect();
            Tensor::from_vec(values, (rows, cols), &self.device)
        };
        let embeddings = uniform(self.vocab_size.max(1), HIDDEN_SIZE)?;
        let emission = uniform(self.num_tags, HIDDEN_SIZE)?;

        self.varmap.set_one("embeddings.weight", embeddings)?;
        self.varmap.set_one("emission.weight", emission)
    }

    /// Hidden activations `[seq_len, HIDDEN_SIZE]`: the tanh of the summed
    /// embedding rows of each token. With `drop > 0` every feature of every
    /// token is dropped independently.
    fn hidden(&self, ids: &[Vec<u32>], drop: f32) -> Result<Tensor> {
        let seq_len = ids.len();
        let flat: Vec<u32> = ids.iter().flatten().copied().collect();
        let active = flat.len();
        if active == 0 {
            return Tensor::zeros((seq_len, HIDDEN_SIZE), DType::F32, &self.device);
        }

        // membership[token][k] is 1 when the k-th active feature belongs to token.
        let mut membership = vec![0f32; seq_len * active];
        let mut col = 0;
        for (row, token_ids) in ids.iter().enumerate() {
            for _ in token_ids {
                membership[row * active + col] = 1.0;
                col += 1;
            }
        }
        let mut membership = Tensor::from_vec(membership, (seq_len, active), &self.device)?;
        if drop > 0.0 {
            membership = candle_nn::ops::dropout(&membership, drop)?;
        }

        let rows = self
            .embeddings
            .index_select(&Tensor::from_vec(flat, active, &self.device)?, 0)?;
        membership.matmul(&rows)?.tanh()
    }

    fn emission_scores(&self, ids: &[Vec<u32>], drop: f32) -> Result<Tensor> {
        self.emission.forward(&self.hidden(ids, drop)?)
    }

    /// Emission scores `[seq_len][num_tags]`.
    pub fn emissions(&self, ids: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.emission_scores(ids, 0.0)?.to_vec2()
    }

    /// Transition scores `[num_tags][num_tags]`, indexed `[prev][curr]`.
    pub fn transitions(&self) -> Result<Vec<Vec<f32>>> {
        self.transitions.to_vec2()
    }

    /// Negative log-likelihood of `gold` as a scalar tensor.
    pub fn loss(&self, ids: &[Vec<u32>], gold: &[usize], drop: f32) -> Result<Tensor> {
        let emissions = self.emission_scores(ids, drop)?;
        let log_z = self.log_partition(&emissions)?;
        let gold_score = self.gold_score(&emissions, gold)?;
        log_z.sub(&gold_score)
    }

    /// One SGD step on a single sentence, returning its loss.
    pub fn step(&mut self, ids: &[Vec<u32>], gold: &[usize], drop: f32) -> Result<f32> {
        if gold.is_empty() {
            return Ok(0.0);
        }
        let loss = self.loss(ids, gold, drop)?;
        self.optimizer.backward_step(&loss)?;
        loss.to_scalar::<f32>()
    }

    /// Log-sum of the scores of every allowed tag sequence (forward algorithm).
    fn log_partition(&self, emissions: &Tensor) -> Result<Tensor> {
        let seq_len = emissions.dim(0)?;
        let transitions = self.transitions.add(&self.transition_mask)?;

        let mut alpha = emissions.get(0)?.add(&self.start_mask)?;
        for pos in 1..seq_len {
            let scores = alpha
                .unsqueeze(1)?
                .broadcast_add(&transitions)?
                .broadcast_add(&emissions.get(pos)?.unsqueeze(0)?)?;
            alpha = log_sum_exp(&scores, 0)?;
        }
        log_sum_exp(&alpha, 0)
    }

    fn gold_score(&self, emissions: &Tensor, gold: &[usize]) -> Result<Tensor> {
        let num_tags = self.num_tags;

        let mut tags = vec![0f32; gold.len() * num_tags];
        for (pos, &tag) in gold.iter().enumerate() {
            tags[pos * num_tags + tag] = 1.0;
        }
        let mut pairs = vec![0f32; num_tags * num_tags];
        for pair in gold.windows(2) {
            pairs[pair[0] * num_tags + pair[1]] += 1.0;
        }

        let tags = Tensor::from_vec(tags, (gold.len(), num_tags), &self.device)?;
        let pairs = Tensor::from_vec(pairs, (num_tags, num_tags), &self.device)?;
        emissions
            .mul(&tags)?
            .sum_all()?
            .add(&self.transitions.mul(&pairs)?.sum_all()?)
    }

    /// Write every weight to a safetensors file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)
    }

    /// Overwrite the weights from a safetensors file written by
    /// [`NerModel::save`]. Fails if a tensor is missing or has another shape.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path)
    }
}

fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?;
    let sum = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    sum.add(&max)?.squeeze(dim)
}

impl fmt::Debug for NerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NerModel")
            .field("vocab_size", &self.vocab_size)
            .field("num_tags", &self.num_tags)
            .field("hidden_size", &HIDDEN_SIZE)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn trained(ids: &[Vec<u32>], gold: &[usize], steps: usize) -> (NerModel, Vec<f32>) {
        let mut model = NerModel::new(6, 3).unwrap();
        model.init_weights(&mut StdRng::seed_from_u64(4)).unwrap();
        let losses = (0..steps)
            .map(|_| model.step(ids, gold, 0.0).unwrap())
            .collect();
        (model, losses)
    }

    fn ids() -> Vec<Vec<u32>> {
        vec![vec![0, 1, 2], vec![0, 3], vec![0, 4, 5]]
    }

    #[test]
    fn test_new_model_scores_zero() {
        let model = NerModel::new(4, 3).unwrap();
        assert_eq!(model.emissions(&[vec![0, 1]]).unwrap(), vec![vec![0.0; 3]]);
        assert_eq!(model.transitions().unwrap(), vec![vec![0.0; 3]; 3]);
        assert!(model.emissions(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_token_without_features_scores_bias() {
        let model = NerModel::new(4, 3).unwrap();
        let scores = model.emissions(&[vec![], vec![2]]).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], vec![0.0; 3]);
    }

    #[test]
    fn test_loss_is_positive_and_falls() {
        let (_, losses) = trained(&ids(), &[1, 0, 0], 20);
        assert!(losses.iter().all(|l| *l > 0.0));
        assert!(losses[19] < losses[0]);
    }

    #[test]
    fn test_training_favours_gold_tags() {
        let (model, _) = trained(&ids(), &[1, 2, 0], 30);
        let scores = model.emissions(&ids()).unwrap();
        // `I` can never open a sentence, so its first-token score is not trained.
        assert!(scores[0][1] > scores[0][0]);
        assert!(scores[2][0] > scores[2][1].max(scores[2][2]));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (a, _) = trained(&ids(), &[1, 0, 0], 3);
        let (b, _) = trained(&ids(), &[1, 0, 0], 3);
        assert_eq!(a.emissions(&ids()).unwrap(), b.emissions(&ids()).unwrap());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (model, _) = trained(&ids(), &[1, 0, 0], 5);
        let path = std::env::temp_dir().join(format!("companion-net-{}.safetensors", std::process::id()));
        model.save(&path).unwrap();

        let mut restored = NerModel::new(6, 3).unwrap();
        restored.load(&path).unwrap();
        let mut wrong = NerModel::new(6, 5).unwrap();
        let mismatch = wrong.load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(restored.emissions(&ids()).unwrap(), model.emissions(&ids()).unwrap());
        assert_eq!(restored.transitions().unwrap(), model.transitions().unwrap());
        assert!(mismatch.is_err());
    }
}
