use std::cmp::min;

/// Smallest `seed · a^i · b^j` not below `lower_limit`, searched by walking up in `a` and down in `b`.
fn smallest_product(lower_limit: usize, seed: usize, a: usize, b: usize) -> usize {
    let mut product = seed;
    while product < lower_limit {
        product *= b;
    }
    let mut best = product;
    loop {
        if product > lower_limit {
            if product % b != 0 {
                return best;
            }
            product /= b;
        } else if product < lower_limit {
            product *= a;
        } else {
            return product;
        }
        if product > lower_limit && product < best {
            best = product;
        }
    }
}

/// Returns a grid length not below `lower_limit` that mostly consists of factors of 2 and 3,
/// with up to one other factor less than 12.
///
/// Used to zero pad the working grid so the FFT of an awkwardly sized SLM stays fast.
pub fn fastish_fft_len(lower_limit: usize) -> usize {
    if lower_limit <= 1 {
        return 1;
    }
    [1, 5, 7, 11]
        .iter()
        .fold(lower_limit.next_power_of_two(), |best, &seed| {
            min(best, smallest_product(lower_limit, seed, 2, 3))
        })
}
