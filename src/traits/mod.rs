mod base_impl;
mod num_traits_impls;
mod std_ops;
