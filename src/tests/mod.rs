// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod codec_tests;
pub mod status_tests;
