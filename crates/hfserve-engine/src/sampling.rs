//! Sampling components for token generation
//!
//! Logits processors reshape the distribution in order, then a
//! sampler picks the token. Greedy decoding is used whenever the request
//! has no positive temperature; otherwise sampling draws from a `StdRng`
//! seeded by the request's `seed` when one is given.

use hfserve_interfaces::{LogitsProcessor, Sampler, SamplingContext};
use hfserve_types::{Result, SamplingParams, ServeError, TokenId};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::cmp::Ordering;
use tracing::trace;

/// Temperature-based logits processor
#[derive(Debug, Clone)]
pub struct TemperatureProcessor {
    pub temperature: f32,
}

impl TemperatureProcessor {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl LogitsProcessor for TemperatureProcessor {
    fn process(&self, ctx: &mut SamplingContext) -> Result<()> {
        if self.temperature > 0.0 && self.temperature != 1.0 {
            for logit in ctx.logits.iter_mut() {
                *logit /= self.temperature;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "temperature"
    }
}

/// Top-p (nucleus) logits processor
#[derive(Debug, Clone)]
pub struct TopPProcessor {
    pub p: f32,
}

impl TopPProcessor {
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl LogitsProcessor for TopPProcessor {
    fn process(&self, ctx: &mut SamplingContext) -> Result<()> {
        if !(self.p > 0.0 && self.p < 1.0) || ctx.logits.is_empty() {
            return Ok(());
        }

        let mut indexed: Vec<(usize, f32)> = ctx.logits.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let max_logit = indexed[0].1;
        let exps: Vec<f32> = indexed.iter().map(|(_, l)| (l - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Ok(());
        }

        // Keep the smallest prefix whose mass reaches p
        let mut cumulative = 0.0f32;
        let mut keep = indexed.len();
        for (rank, exp) in exps.iter().enumerate() {
            cumulative += exp / sum;
            if cumulative >= self.p {
                keep = rank + 1;
                break;
            }
        }
        for (idx, _) in &indexed[keep..] {
            ctx.logits[*idx] = f32::NEG_INFINITY;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "top_p"
    }
}

/// Greedy sampler (always selects highest probability token)
#[derive(Debug, Clone)]
pub struct GreedySampler;

impl Sampler for GreedySampler {
    fn sample(&self, logits: &[f32], _rng: &mut dyn RngCore) -> Result<TokenId> {
        logits
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| TokenId::new(i as u32))
            .ok_or_else(|| ServeError::inference("Cannot sample from empty logits"))
    }

    fn name(&self) -> &str {
        "greedy"
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Multinomial sampler over the softmax of (processed) logits
#[derive(Debug, Clone)]
pub struct MultinomialSampler;

impl Sampler for MultinomialSampler {
    fn sample(&self, logits: &[f32], rng: &mut dyn RngCore) -> Result<TokenId> {
        if logits.is_empty() {
            return Err(ServeError::inference("Cannot sample from empty logits"));
        }
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return GreedySampler.sample(logits, rng);
        }

        let draw: f32 = rng.gen_range(0.0..1.0);
        let target = draw * sum;
        let mut cumulative = 0.0f32;
        for (i, exp) in exps.iter().enumerate() {
            cumulative += exp;
            if target < cumulative {
                return Ok(TokenId::new(i as u32));
            }
        }
        // Rounding left the target past the last bucket
        let last = exps.iter().rposition(|&e| e > 0.0).unwrap_or(0);
        Ok(TokenId::new(last as u32))
    }

    fn name(&self) -> &str {
        "multinomial"
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Processors plus sampler plus RNG for one generation
pub struct SamplingPipeline {
    params: SamplingParams,
    processors: Vec<Box<dyn LogitsProcessor>>,
    sampler: Box<dyn Sampler>,
    rng: StdRng,
}

impl std::fmt::Debug for SamplingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingPipeline")
            .field(
                "processors",
                &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("sampler", &self.sampler.name())
            .finish()
    }
}

impl SamplingPipeline {
    /// Build the pipeline `params` call for
    pub fn from_params(params: &SamplingParams) -> Self {
        let mut processors: Vec<Box<dyn LogitsProcessor>> = Vec::new();
        let sampler: Box<dyn Sampler> = if params.is_greedy() {
            Box::new(GreedySampler)
        } else {
            processors.push(Box::new(TemperatureProcessor::new(params.temperature)));
            if params.top_p < 1.0 {
                processors.push(Box::new(TopPProcessor::new(params.top_p)));
            }
            Box::new(MultinomialSampler)
        };

        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            params: params.clone(),
            processors,
            sampler,
            rng,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.sampler.is_deterministic()
    }

    /// Apply all processors to `logits` in place and sample a token
    pub fn next_token(
        &mut self,
        step: usize,
        logits: &mut [f32],
        previous_tokens: &[TokenId],
    ) -> Result<TokenId> {
        {
            let mut ctx = SamplingContext::new(step, &self.params, logits, previous_tokens);
            for processor in &self.processors {
                processor.process(&mut ctx)?;
            }
        }
        let token = self.sampler.sample(logits, &mut self.rng)?;
        trace!(step, token = token.get(), sampler = self.sampler.name(), "Sampled token");
        Ok(token)
    }
}
