use lockbox_crypto::{decrypt, encrypt, generate_content_key};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 16777216])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let key = generate_content_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576, 16777216])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let key = generate_content_key();
    let data = make_data(size);
    let encrypted = encrypt(&data, &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&encrypted), divan::black_box(&key)).unwrap());
}

fn main() {
    divan::main();
}
