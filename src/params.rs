//! Consensus safety parameters, injected into every engine

/// The parameters governing a `Snow*` instance.
///
/// These used to live as per-module constants; they are injected instead so that
/// a node can run several chains with different committee sizes side by side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Parameters {
    /// Number of validators sampled per poll.
    pub k: usize,
    /// Minimum number of distinct respondents for a poll vote to count.
    pub alpha: usize,
    /// Confidence threshold for accepting a virtuous transaction.
    pub beta1: u32,
    /// Confidence threshold for accepting a rogue transaction.
    pub beta2: u32,
    /// Maximum number of polls in flight at any time.
    pub concurrent_polls: usize,
}

impl Parameters {
    pub fn verify(&self) -> crate::Result<()> {
        if self.k == 0 || self.k > 64 {
            return Err(crate::Error::InvalidParameters(format!(
                "k = {}: 0 < k <= 64 required",
                self.k
            )));
        }
        if self.alpha <= self.k / 2 || self.alpha > self.k {
            return Err(crate::Error::InvalidParameters(format!(
                "alpha = {}: k/2 < alpha <= k required (k = {})",
                self.alpha, self.k
            )));
        }
        if self.beta1 == 0 || self.beta1 > self.beta2 {
            return Err(crate::Error::InvalidParameters(format!(
                "beta1 = {}, beta2 = {}: 0 < beta1 <= beta2 required",
                self.beta1, self.beta2
            )));
        }
        if self.concurrent_polls == 0 || self.concurrent_polls > self.beta1 as usize {
            return Err(crate::Error::InvalidParameters(format!(
                "concurrent_polls = {}: 0 < concurrent_polls <= beta1 required (beta1 = {})",
                self.concurrent_polls, self.beta1
            )));
        }
        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters { k: 20, alpha: 14, beta1: 15, beta2: 20, concurrent_polls: 4 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_parameters_verify() {
        Parameters::default().verify().unwrap();
    }

    #[test]
    fn test_invalid_parameters() {
        let p = Parameters { k: 0, ..Parameters::default() };
        assert!(p.verify().is_err());

        // Respondent sets are machine words, so committees are capped at 64
        let p = Parameters { k: 65, alpha: 40, ..Parameters::default() };
        assert!(p.verify().is_err());

        // alpha at most k/2 is not a majority
        let p = Parameters { k: 10, alpha: 5, ..Parameters::default() };
        assert!(p.verify().is_err());

        let p = Parameters { k: 10, alpha: 11, ..Parameters::default() };
        assert!(p.verify().is_err());

        let p = Parameters { beta1: 21, beta2: 20, ..Parameters::default() };
        assert!(p.verify().is_err());

        let p = Parameters { concurrent_polls: 0, ..Parameters::default() };
        assert!(p.verify().is_err());
    }

    #[test]
    fn test_minimal_parameters() {
        let p = Parameters { k: 1, alpha: 1, beta1: 1, beta2: 1, concurrent_polls: 1 };
        p.verify().unwrap();
    }
}
