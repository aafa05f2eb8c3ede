///
/// Enumerates, in lexicographic order, every level vector `l >= 0` with
/// `l[d] <= max_levels[d]` and `sum(l) <= level_bound`.
///
#[derive(Clone, Debug)]
pub struct BoundedSumIterator
{
    max_levels: Vec<u32>,
    level_bound: u32,
    index_sum: u32,
    index_head: Vec<u32>,
    first: bool,
    done: bool,
}

impl BoundedSumIterator
{
    pub fn new(max_levels: &[u32], level_bound: u32) -> Self
    {
        let ndim = max_levels.len();
        Self { max_levels: max_levels.to_owned(), level_bound, index_sum: 0, index_head: vec![0; ndim], first: true, done: ndim == 0 }
    }

    /// Simplex `|l| <= level_bound` without per-dimension caps.
    pub fn simplex(ndim: usize, level_bound: u32) -> Self
    {
        Self::new(&vec![level_bound; ndim], level_bound)
    }

    pub fn level_bound(&self) -> u32
    {
        self.level_bound
    }

    pub fn max_levels(&self) -> &[u32]
    {
        &self.max_levels
    }
}

impl Iterator for BoundedSumIterator
{
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done
        {
            return None;
        }
        if self.first
        {
            self.first = false;
            return Some(self.index_head.clone());
        }
        let last = self.index_head.len() - 1;
        if self.level_bound > self.index_sum && self.max_levels[last] > self.index_head[last]
        {
            self.index_sum += 1;
            self.index_head[last] += 1;
            return Some(self.index_head.clone());
        }
        // carry: bump the rightmost dimension that still has room and reset everything after it
        let mut prefix_sum = self.index_sum;
        for dim in (0..last).rev()
        {
            prefix_sum -= self.index_head[dim + 1];
            if self.index_head[dim] < self.max_levels[dim] && prefix_sum < self.level_bound
            {
                self.index_head[dim] += 1;
                self.index_head[dim + 1..].iter_mut().for_each(|l| *l = 0);
                self.index_sum = prefix_sum + 1;
                return Some(self.index_head.clone());
            }
        }
        self.done = true;
        None
    }
}

#[test]
fn test_iterator()
{
    let levels: Vec<Vec<u32>> = BoundedSumIterator::simplex(2, 2).collect();
    assert_eq!(levels, vec![vec![0, 0], vec![0, 1], vec![0, 2], vec![1, 0], vec![1, 1], vec![2, 0]]);
    // number of level vectors in a simplex: binomial(n + d, d)
    assert_eq!(BoundedSumIterator::simplex(3, 4).count(), 35);
    assert_eq!(BoundedSumIterator::simplex(1, 3).count(), 4);
}

#[test]
fn test_capped_iterator()
{
    let levels: Vec<Vec<u32>> = BoundedSumIterator::new(&[1, 3], 2).collect();
    assert_eq!(levels, vec![vec![0, 0], vec![0, 1], vec![0, 2], vec![1, 0], vec![1, 1]]);
    assert!(levels.iter().all(|l| l.iter().sum::<u32>() <= 2));
    assert_eq!(BoundedSumIterator::new(&[], 2).count(), 0);
}
