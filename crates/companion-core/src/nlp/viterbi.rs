//! # Viterbi Decoding
//!
//! Finds the highest-scoring BIO tag sequence given per-token emission
//! scores and tag-to-tag transition scores. Transitions forbidden by the BIO
//! scheme are never taken, so decoded sequences are always well formed.

use crate::nlp::bio_tags::BioTag;

/// Viterbi decoder for BIO tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    valid_transitions: Vec<Vec<bool>>,
}

impl ViterbiDecoder {
    /// Create a decoder for `num_tags` tags, pre-computing the valid
    /// transitions.
    pub fn new(num_tags: usize) -> Self {
        let valid_transitions = (0..num_tags)
            .map(|prev| {
                (0..num_tags)
                    .map(|curr| {
                        BioTag::is_valid_transition(
                            BioTag::from_index(prev),
                            BioTag::from_index(curr),
                        )
                    })
                    .collect()
            })
            .collect();

        Self {
            num_tags,
            valid_transitions,
        }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` scores per token
    /// * `transition_matrix` - `[num_tags][num_tags]` scores, indexed `[prev][curr]`
    ///
    /// # Returns
    /// The optimal tag sequence.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Vec<BioTag> {
        let seq_len = emission_scores.len();
        if seq_len == 0 || self.num_tags == 0 {
            return Vec::new();
        }

        let mut dp = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr = vec![vec![0usize; self.num_tags]; seq_len];

        for tag in 0..self.num_tags {
            if BioTag::from_index(tag).is_valid_start() {
                dp[0][tag] = emission_scores[0][tag];
            }
        }

        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    if !self.valid_transitions[prev_tag][curr_tag] {
                        continue;
                    }

                    let score = dp[pos - 1][prev_tag] + transition_matrix[prev_tag][curr_tag];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                dp[pos][curr_tag] = best_score + emission_scores[pos][curr_tag];
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Ties resolve to the lowest index, so an all-zero model tags everything `O`.
        let mut best_final_tag = 0;
        for tag in 1..self.num_tags {
            if dp[seq_len - 1][tag] > dp[seq_len - 1][best_final_tag] {
                best_final_tag = tag;
            }
        }

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;
        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        path.into_iter().map(BioTag::from_index).collect()
    }
}
